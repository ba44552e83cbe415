use log::debug;

use crate::error::Error;
use crate::task_list::TaskListStatus;
use crate::task_region::TaskRegion;

/// The ordered sequence of regions making up one full advance of a
/// simulation. Regions execute strictly in order: every list of region
/// `i` must be complete before any list of region `i + 1` is polled. This
/// barrier is a hard guarantee, not a hint; it is what lets a later
/// region assume all partitions have finished the earlier one (for
/// example, that every boundary buffer has been filled).
///
#[derive(Default)]
pub struct TaskCollection {
    regions: Vec<TaskRegion>,
}

impl TaskCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new, empty region sized for the given number of
    /// partitions, and return it so tasks can be added.
    pub fn add_region(&mut self, num_lists: usize) -> &mut TaskRegion {
        self.regions.push(TaskRegion::new(num_lists));
        self.regions.last_mut().unwrap()
    }

    pub(crate) fn regions_mut(&mut self) -> &mut [TaskRegion] {
        &mut self.regions
    }

    /// Run every region to completion in order, polling the lists of the
    /// current region round-robin. Each `do_available` call is cheap and
    /// non-blocking, so a slow partition holds the others up only at the
    /// region barrier. Returns an error naming the offending region and
    /// list if any list reports itself stuck; the task graph is not in a
    /// usable state after that and the driver should abort the run.
    ///
    pub fn execute(&mut self) -> Result<(), Error> {
        let num_regions = self.regions.len();

        for (rdx, region) in self.regions.iter_mut().enumerate() {
            loop {
                let mut complete = 0;

                for ldx in 0..region.len() {
                    if region[ldx].is_complete() {
                        complete += 1;
                        continue;
                    }
                    match region[ldx].do_available() {
                        TaskListStatus::Complete => complete += 1,
                        TaskListStatus::Running | TaskListStatus::NothingToDo => {}
                        TaskListStatus::Stuck => {
                            return Err(Error::Stalled {
                                region: rdx,
                                list: ldx,
                                pending: region[ldx].size(),
                            });
                        }
                    }
                }
                if complete == region.len() {
                    break;
                }
            }
            debug!("region {} of {} complete", rdx + 1, num_regions);
        }
        Ok(())
    }
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::TaskCollection;
    use crate::error::Error;
    use crate::task::TaskStatus;
    use crate::task_id::TaskId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn empty_collection_executes() {
        assert!(TaskCollection::new().execute().is_ok());
    }

    #[test]
    fn regions_execute_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut collection = TaskCollection::new();

        let record = |log: &Arc<Mutex<Vec<(usize, usize)>>>, rdx| {
            let log = log.clone();
            move |i| {
                log.lock().unwrap().push((rdx, i));
                TaskStatus::Complete
            }
        };
        collection
            .add_region(3)
            .add_task(TaskId::none(), record(&log, 0));
        collection
            .add_region(3)
            .add_task(TaskId::none(), record(&log, 1));

        collection.execute().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 6);
        assert!(log[..3].iter().all(|(rdx, _)| *rdx == 0));
        assert!(log[3..].iter().all(|(rdx, _)| *rdx == 1));
    }

    #[test]
    fn second_region_never_starts_while_the_first_is_stalled() {
        let poked = Arc::new(AtomicUsize::new(0));
        let mut collection = TaskCollection::new();

        let region = collection.add_region(1);
        region.add_task(TaskId::none(), |_| TaskStatus::Incomplete);
        region[0].set_stall_limit(10);

        collection.add_region(1).add_task(TaskId::none(), {
            let poked = poked.clone();
            move |_| {
                poked.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Complete
            }
        });

        match collection.execute() {
            Err(Error::Stalled {
                region: 0,
                list: 0,
                pending: 1,
            }) => {}
            other => panic!("expected a stall in region 0, got {:?}", other),
        }
        assert_eq!(poked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn region_with_an_unpopulated_list_still_terminates() {
        let mut collection = TaskCollection::new();
        let region = collection.add_region(3);
        region[0].add_task(TaskId::none(), || TaskStatus::Complete);
        region[2].add_task(TaskId::none(), || TaskStatus::Complete);
        collection.execute().unwrap();
    }
}
