use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use core_affinity::{get_core_ids, set_for_current};
use crossbeam_channel::unbounded;
use log::{debug, error};

use crate::error::Error;
use crate::task_collection::TaskCollection;
use crate::task_list::{TaskList, TaskListStatus};
use crate::task_region::TaskRegion;

/// Run every region of the collection to completion, polling each
/// region's lists from a pool of worker threads instead of a single
/// round-robin loop. Lists are dealt to the workers cyclically and each
/// worker polls its own hand until the hand is drained, so no list can
/// starve another: partitions progress independently and meet only at the
/// region barrier, which is enforced by joining the whole pool before the
/// next region starts. Workers are pinned to distinct cores when a core
/// inventory is available.
///
/// Per-list completion is reported over a channel rather than inferred by
/// spinning on shared state. If any list reports itself stuck, a shared
/// abort flag drains the remaining workers and the run fails with
/// [`Error::Stalled`].
///
pub fn execute_par(collection: &mut TaskCollection, num_workers: usize) -> Result<(), Error> {
    for (rdx, region) in collection.regions_mut().iter_mut().enumerate() {
        execute_region(rdx, region, num_workers)?;
    }
    Ok(())
}

fn execute_region(rdx: usize, region: &mut TaskRegion, num_workers: usize) -> Result<(), Error> {
    if region.is_empty() {
        return Ok(());
    }
    let num_workers = num_workers.max(1).min(region.len());
    let core_ids = get_core_ids().unwrap_or_default();
    let abort = AtomicBool::new(false);
    let (sink, source) = unbounded();

    let mut hands: Vec<Vec<(usize, &mut TaskList)>> =
        (0..num_workers).map(|_| Vec::new()).collect();

    for (ldx, list) in region.iter_mut().enumerate() {
        hands[ldx % num_workers].push((ldx, list));
    }

    thread::scope(|scope| {
        for (wdx, mut hand) in hands.into_iter().enumerate() {
            let sink = sink.clone();
            let abort = &abort;
            let core_id = core_ids.get(wdx).copied();

            scope.spawn(move || {
                if let Some(core_id) = core_id {
                    set_for_current(core_id);
                }
                while !hand.is_empty() && !abort.load(Ordering::Relaxed) {
                    let mut idle = true;

                    hand.retain_mut(|(ldx, list)| match list.do_available() {
                        TaskListStatus::Complete => {
                            sink.send((*ldx, TaskListStatus::Complete)).unwrap();
                            false
                        }
                        TaskListStatus::Stuck => {
                            abort.store(true, Ordering::Relaxed);
                            sink.send((*ldx, TaskListStatus::Stuck)).unwrap();
                            false
                        }
                        TaskListStatus::Running => {
                            idle = false;
                            true
                        }
                        TaskListStatus::NothingToDo => true,
                    });
                    if idle {
                        // Every list in the hand is waiting on an upstream
                        // list owned by some other worker.
                        thread::yield_now();
                    }
                }
            });
        }
    });
    drop(sink);

    for (ldx, status) in source {
        if let TaskListStatus::Stuck = status {
            error!("list {} of region {} stalled; aborting the run", ldx, rdx);
            return Err(Error::Stalled {
                region: rdx,
                list: ldx,
                pending: region[ldx].size(),
            });
        }
    }
    debug!("region {} complete on {} workers", rdx, num_workers);
    Ok(())
}

// ============================================================================
#[cfg(test)]
mod test {

    use super::execute_par;
    use crate::error::Error;
    use crate::task::TaskStatus;
    use crate::task_collection::TaskCollection;
    use crate::task_id::TaskId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn more_lists_than_workers_still_complete() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut collection = TaskCollection::new();
        let region = collection.add_region(8);

        let a = region.add_task(TaskId::none(), {
            let runs = runs.clone();
            move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Complete
            }
        });
        region.add_task(a, {
            let runs = runs.clone();
            move |_| {
                runs.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Complete
            }
        });

        execute_par(&mut collection, 3).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn upstream_gating_holds_across_workers() {
        let order = Arc::new(AtomicUsize::new(0));
        let mut collection = TaskCollection::new();
        let region = collection.add_region(2);

        region[0].add_task(TaskId::none(), {
            let order = order.clone();
            let mut polls = 0;
            move || {
                polls += 1;
                if polls < 50 {
                    TaskStatus::Incomplete
                } else {
                    order.fetch_add(1, Ordering::SeqCst);
                    TaskStatus::Complete
                }
            }
        });
        // Gate list 1 on list 0; the two lists land on different workers.
        region.gate(1, 0);
        region[1].add_task(TaskId::none(), {
            let order = order.clone();
            move || {
                assert_eq!(order.load(Ordering::SeqCst), 1);
                order.fetch_add(1, Ordering::SeqCst);
                TaskStatus::Complete
            }
        });

        execute_par(&mut collection, 2).unwrap();
        assert_eq!(order.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn one_stalled_list_aborts_the_whole_pool() {
        let mut collection = TaskCollection::new();
        let region = collection.add_region(4);
        region.add_task(TaskId::none(), |_| TaskStatus::Complete);
        region[2].add_task(TaskId::none(), || TaskStatus::Incomplete);
        region[2].set_stall_limit(25);

        match execute_par(&mut collection, 4) {
            Err(Error::Stalled {
                region: 0, list: 2, ..
            }) => {}
            other => panic!("expected list 2 to stall, got {:?}", other),
        }
    }
}
