use std::ops::{Index, IndexMut};

use crate::error::Error;
use crate::task::TaskStatus;
use crate::task_id::TaskId;
use crate::task_list::TaskList;

/// A fixed-size group of task lists, one per partition, which are assumed
/// to receive a structurally identical sequence of task additions: every
/// partition runs the same graph, and only the data captured by the
/// actions differs. The broadcast [`TaskRegion::add_task`] enforces that
/// assumption by checking that every list hands back the same identity.
/// For the occasional step whose *addition* legitimately differs per
/// partition, individual lists are reachable by index; such additions must
/// come after the broadcast ones, or the identity check will trip.
///
pub struct TaskRegion {
    lists: Vec<TaskList>,
}

impl TaskRegion {
    pub fn new(num_lists: usize) -> Self {
        Self {
            lists: (0..num_lists).map(|_| TaskList::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskList> {
        self.lists.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskList> {
        self.lists.iter_mut()
    }

    /// Gate list `downstream` on the full completion of list `upstream`
    /// within this region. Gated lists report nothing to do until the
    /// upstream list holds no pending tasks.
    ///
    pub fn gate(&mut self, downstream: usize, upstream: usize) {
        let flag = self.lists[upstream].complete_flag();
        self.lists[downstream].add_upstream(flag);
    }

    /// Broadcast one task addition to every list in index order and return
    /// the common identity. The action is cloned once per list, and the
    /// clone bound into list `i` is invoked with partition index `i`; that
    /// index is how a shared action reaches per-partition state. Panics if
    /// the lists return different identities, which means the
    /// per-partition graphs were not built identically and the run cannot
    /// be trusted.
    ///
    pub fn add_task<F>(&mut self, dependency: TaskId, action: F) -> TaskId
    where
        F: FnMut(usize) -> TaskStatus + Clone + Send + 'static,
    {
        let mut common = None;

        for (i, list) in self.lists.iter_mut().enumerate() {
            let mut action = action.clone();
            let id = list.add_task(dependency, move || action(i));

            match common {
                None => common = Some(id),
                Some(expected) => {
                    if id != expected {
                        panic!(
                            "{}",
                            Error::DivergentTaskGraph {
                                list: i,
                                expected,
                                actual: id,
                            }
                        );
                    }
                }
            }
        }
        common.unwrap_or_else(TaskId::none)
    }
}

impl Index<usize> for TaskRegion {
    type Output = TaskList;

    fn index(&self, i: usize) -> &TaskList {
        &self.lists[i]
    }
}

impl IndexMut<usize> for TaskRegion {
    fn index_mut(&mut self, i: usize) -> &mut TaskList {
        &mut self.lists[i]
    }
}
