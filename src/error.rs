use std::error;
use std::fmt;

use crate::task_id::TaskId;

/**
 * Error to represent a corrupted task graph or a run that can no longer make
 * progress. Graph-construction errors are unrecoverable and ride inside
 * panics; a stalled run is returned to the driver, which decides whether to
 * dump diagnostics and abort.
 */
#[derive(Debug)]
pub enum Error {
    DivergentTaskGraph {
        list: usize,
        expected: TaskId,
        actual: TaskId,
    },
    UndefinedDependency {
        dependency: TaskId,
        assigned: TaskId,
    },
    Stalled {
        region: usize,
        list: usize,
        pending: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            DivergentTaskGraph {
                list,
                expected,
                actual,
            } => writeln!(
                fmt,
                "task graphs diverged: list {} returned identity {} where {} was expected",
                list, actual, expected
            ),
            UndefinedDependency {
                dependency,
                assigned,
            } => writeln!(
                fmt,
                "dependency {} references identities not yet assigned (assigned so far: {})",
                dependency, assigned
            ),
            Stalled {
                region,
                list,
                pending,
            } => writeln!(
                fmt,
                "list {} of region {} stalled with {} tasks pending",
                list, region, pending
            ),
        }
    }
}

impl error::Error for Error {}
