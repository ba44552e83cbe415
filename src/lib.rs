//! Blockflow is a dependency-graph task scheduler for block-decomposed,
//! iterative numerical simulations. A driver advances many independent
//! spatial partitions ("blocks") through a shared sequence of
//! computational steps (field updates, boundary exchange, particle
//! transport) by building, for each step, a collection of task graphs:
//! one graph per partition, grouped into barrier-synchronized regions.
//! Tasks declare which of their predecessors must finish first, may
//! report themselves incomplete to be polled again on a later pass (for
//! steps waiting on a non-blocking data exchange), and run cooperatively
//! without preemption. Within a region the per-partition graphs are
//! assumed structurally identical, and the scheduler verifies that
//! assumption as the graphs are built.

pub mod error;
pub mod executor;
pub mod task;
pub mod task_collection;
pub mod task_id;
pub mod task_list;
pub mod task_region;
