use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, trace};

use crate::error::Error;
use crate::task::{Task, TaskStatus};
use crate::task_id::TaskId;

/// How many consecutive completion-free passes a list tolerates before it
/// reports itself stuck. Asynchronous steps routinely need many polls to
/// finish (a pending boundary exchange completes whenever the data shows
/// up), so the default is generous. Drivers polling fine-grained graphs
/// may want a smaller limit via [`TaskList::set_stall_limit`].
///
pub const DEFAULT_STALL_LIMIT: usize = 1_000_000;

/// Returned by [`TaskList::do_available`] to report how a polling pass
/// left the list.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskListStatus {
    /// No pending tasks remain.
    Complete,
    /// Tasks are still pending and polling should continue.
    Running,
    /// Tasks remain pending but the list has stopped making progress:
    /// either no pending task is eligible to run, or the stall limit was
    /// reached with eligible tasks running and never completing.
    Stuck,
    /// An upstream list has not finished, so no tasks were attempted.
    NothingToDo,
}

/// The ordered task queue of one partition. Tasks are appended with
/// explicit dependency masks, then driven by repeated non-blocking calls
/// to [`TaskList::do_available`], each of which makes one pass over the
/// pending tasks and runs whichever have all their prerequisites met.
/// Execution order respects the dependency partial order but is otherwise
/// insertion-order-stable.
///
/// A list may be gated on other lists: [`TaskList::depends_on`] registers
/// an upstream list whose full completion is required before this list
/// attempts any work. Completion is published through a shared atomic
/// flag, so gating works when the lists are polled from different worker
/// threads.
///
pub struct TaskList {
    tasks: Vec<Task>,
    tasks_added: usize,
    assigned: TaskId,
    completed: TaskId,
    upstream: Vec<Arc<AtomicBool>>,
    complete: Arc<AtomicBool>,
    stalled_passes: usize,
    stall_limit: usize,
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskList {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            tasks_added: 0,
            assigned: TaskId::none(),
            completed: TaskId::none(),
            upstream: Vec::new(),
            complete: Arc::new(AtomicBool::new(true)),
            stalled_passes: 0,
            stall_limit: DEFAULT_STALL_LIMIT,
        }
    }

    /// Gate this list on the full completion of another list. Until every
    /// registered upstream list is complete, `do_available` returns
    /// [`TaskListStatus::NothingToDo`] without attempting any tasks.
    ///
    pub fn depends_on(&mut self, upstream: &TaskList) {
        self.upstream.push(upstream.complete.clone())
    }

    pub(crate) fn complete_flag(&self) -> Arc<AtomicBool> {
        self.complete.clone()
    }

    pub(crate) fn add_upstream(&mut self, flag: Arc<AtomicBool>) {
        self.upstream.push(flag)
    }

    /// Append a task whose action runs once all the identities in
    /// `dependency` are complete, and return its identity. The action is
    /// bound to its arguments by ordinary closure capture; capture state
    /// by value unless the task is meant to observe later mutations
    /// through a shared handle. Panics if the dependency mask names an
    /// identity this list has not assigned yet.
    ///
    pub fn add_task<F>(&mut self, dependency: TaskId, action: F) -> TaskId
    where
        F: FnMut() -> TaskStatus + Send + 'static,
    {
        if !self.assigned.contains(dependency) {
            panic!(
                "{}",
                Error::UndefinedDependency {
                    dependency,
                    assigned: self.assigned,
                }
            );
        }
        let id = TaskId::new(self.tasks_added + 1);

        self.tasks.push(Task::new(id, dependency, action));
        self.tasks_added += 1;
        self.assigned |= id;
        self.complete.store(false, Ordering::Release);
        id
    }

    /// True if every upstream list this one is gated on has completed.
    pub fn is_ready(&self) -> bool {
        self.upstream
            .iter()
            .all(|flag| flag.load(Ordering::Acquire))
    }

    /// True if no pending tasks remain.
    pub fn is_complete(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The number of pending tasks.
    pub fn size(&self) -> usize {
        self.tasks.len()
    }

    /// The mask of identities this list has completed so far.
    pub fn completed(&self) -> TaskId {
        self.completed
    }

    /// Bound the number of consecutive completion-free passes tolerated
    /// before `do_available` reports the list stuck.
    pub fn set_stall_limit(&mut self, passes: usize) {
        self.stall_limit = passes
    }

    /// Make one non-blocking pass over the pending tasks. If an upstream
    /// list is unfinished, return immediately without attempting
    /// anything. Otherwise run, in insertion order, every task whose
    /// dependency mask is satisfied by the completion mask; the mask is
    /// updated as tasks complete, so a task unlocked by an earlier task
    /// in the same pass runs in that pass. Tasks that report
    /// [`TaskStatus::Complete`] are removed; tasks that report
    /// [`TaskStatus::Incomplete`] stay pending and are polled again on a
    /// later pass.
    ///
    pub fn do_available(&mut self) -> TaskListStatus {
        if !self.is_ready() {
            return TaskListStatus::NothingToDo;
        }
        let mut eligible = 0;
        let mut finished = 0;

        for n in 0..self.tasks.len() {
            if self.completed.contains(self.tasks[n].dependency()) {
                eligible += 1;

                if let TaskStatus::Complete = self.tasks[n].run() {
                    self.tasks[n].mark_complete();
                    self.completed |= self.tasks[n].id();
                    finished += 1;
                    trace!(
                        "task {} complete; mask is now {}",
                        self.tasks[n].id(),
                        self.completed
                    );
                }
            }
        }
        self.tasks.retain(|task| !task.is_complete());

        if self.tasks.is_empty() {
            self.complete.store(true, Ordering::Release);
            self.stalled_passes = 0;
            debug!("list complete after {} tasks", self.tasks_added);
            return TaskListStatus::Complete;
        }
        if eligible == 0 {
            // The mask is mutated only by this list's own passes, so if no
            // pending task is eligible now, none ever will be.
            error!(
                "no pending task is eligible to run; the graph cannot make progress: {:?}",
                self
            );
            return TaskListStatus::Stuck;
        }
        if finished == 0 {
            self.stalled_passes += 1;

            if self.stalled_passes >= self.stall_limit {
                error!(
                    "no task has completed in {} passes, {} still pending: {:?}",
                    self.stalled_passes,
                    self.tasks.len(),
                    self
                );
                return TaskListStatus::Stuck;
            }
        } else {
            self.stalled_passes = 0;
        }
        TaskListStatus::Running
    }

    /// Clear all state so the list can be reused for the next step. The
    /// published completion flag is reset in place, so lists gated on
    /// this one keep observing it.
    ///
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.tasks_added = 0;
        self.assigned = TaskId::none();
        self.completed = TaskId::none();
        self.upstream.clear();
        self.stalled_passes = 0;
        self.complete.store(true, Ordering::Release);
    }
}

impl fmt::Debug for TaskList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "TaskList ({} pending of {} added, completed {})",
            self.tasks.len(),
            self.tasks_added,
            self.completed
        )?;
        for task in &self.tasks {
            write!(f, " {} <- {}", task.id(), task.dependency())?;
        }
        Ok(())
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::{TaskList, TaskListStatus};
    use crate::task::TaskStatus;
    use crate::task_id::TaskId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn empty_list_is_complete_on_the_first_pass() {
        let mut list = TaskList::new();
        assert!(list.is_complete());
        assert_eq!(list.do_available(), TaskListStatus::Complete);
    }

    #[test]
    fn identities_are_assigned_sequentially() {
        let mut list = TaskList::new();
        let a = list.add_task(TaskId::none(), || TaskStatus::Complete);
        let b = list.add_task(TaskId::none(), || TaskStatus::Complete);
        assert_eq!(a, TaskId::new(1));
        assert_eq!(b, TaskId::new(2));
        assert_eq!(list.size(), 2);
    }

    #[test]
    fn three_task_chain_cascades_in_one_pass() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut list = TaskList::new();

        let push = |order: &Arc<Mutex<Vec<usize>>>, n| {
            let order = order.clone();
            move || {
                order.lock().unwrap().push(n);
                TaskStatus::Complete
            }
        };
        let a = list.add_task(TaskId::none(), push(&order, 1));
        let b = list.add_task(a, push(&order, 2));
        let _ = list.add_task(a | b, push(&order, 3));

        assert_eq!(list.do_available(), TaskListStatus::Complete);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        assert!(list.completed().contains(a | b));
    }

    #[test]
    fn dependencies_are_never_violated() {
        // Task 3 depends on 1 and 2; task 2 needs several polls, so the
        // pass ordering must hold task 3 back until 2 has completed.
        let done = Arc::new(AtomicUsize::new(0));
        let mut list = TaskList::new();

        let a = list.add_task(TaskId::none(), {
            let done = done.clone();
            move || {
                done.fetch_or(1, Ordering::SeqCst);
                TaskStatus::Complete
            }
        });
        let b = list.add_task(TaskId::none(), {
            let done = done.clone();
            let mut polls = 0;
            move || {
                polls += 1;
                if polls < 3 {
                    TaskStatus::Incomplete
                } else {
                    done.fetch_or(2, Ordering::SeqCst);
                    TaskStatus::Complete
                }
            }
        });
        list.add_task(a | b, {
            let done = done.clone();
            move || {
                assert_eq!(done.load(Ordering::SeqCst), 3);
                TaskStatus::Complete
            }
        });

        let mut passes = 0;
        while list.do_available() != TaskListStatus::Complete {
            passes += 1;
            assert!(passes < 10);
        }
    }

    #[test]
    fn multi_poll_task_takes_one_pass_per_poll() {
        let mut list = TaskList::new();
        let mut polls = 0;

        list.add_task(TaskId::none(), move || {
            polls += 1;
            if polls < 3 {
                TaskStatus::Incomplete
            } else {
                TaskStatus::Complete
            }
        });
        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Complete);
    }

    #[test]
    fn gated_list_does_nothing_until_upstream_completes() {
        let mut upstream = TaskList::new();
        let mut polls = 0;

        upstream.add_task(TaskId::none(), move || {
            polls += 1;
            if polls < 2 {
                TaskStatus::Incomplete
            } else {
                TaskStatus::Complete
            }
        });

        let ran = Arc::new(AtomicUsize::new(0));
        let mut gated = TaskList::new();
        gated.depends_on(&upstream);
        gated.add_task(TaskId::none(), {
            let ran = ran.clone();
            move || {
                ran.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Complete
            }
        });

        assert_eq!(gated.do_available(), TaskListStatus::NothingToDo);
        assert_eq!(upstream.do_available(), TaskListStatus::Running);
        assert_eq!(gated.do_available(), TaskListStatus::NothingToDo);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        assert_eq!(upstream.do_available(), TaskListStatus::Complete);
        assert_eq!(gated.do_available(), TaskListStatus::Complete);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_completing_task_hits_the_stall_limit() {
        let mut list = TaskList::new();
        list.set_stall_limit(3);
        list.add_task(TaskId::none(), || TaskStatus::Incomplete);

        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Stuck);
    }

    #[test]
    fn progress_resets_the_stall_counter() {
        let mut list = TaskList::new();
        list.set_stall_limit(3);

        let mut polls = 0;
        let a = list.add_task(TaskId::none(), move || {
            polls += 1;
            if polls < 2 {
                TaskStatus::Incomplete
            } else {
                TaskStatus::Complete
            }
        });
        list.add_task(a, || TaskStatus::Incomplete);

        assert_eq!(list.do_available(), TaskListStatus::Running);
        // Pass 2 completes task 1, so the counter starts over for task 2.
        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Running);
        assert_eq!(list.do_available(), TaskListStatus::Stuck);
    }

    #[test]
    fn reset_makes_the_list_reusable() {
        let mut list = TaskList::new();
        list.add_task(TaskId::none(), || TaskStatus::Complete);
        assert_eq!(list.do_available(), TaskListStatus::Complete);

        list.reset();
        assert!(list.is_complete());
        assert!(list.completed().is_none());

        let a = list.add_task(TaskId::none(), || TaskStatus::Complete);
        assert_eq!(a, TaskId::new(1));
        assert_eq!(list.do_available(), TaskListStatus::Complete);
    }

    #[test]
    #[should_panic(expected = "not yet assigned")]
    fn forward_dependency_panics_at_add_time() {
        let mut list = TaskList::new();
        list.add_task(TaskId::new(2), || TaskStatus::Complete);
    }
}
