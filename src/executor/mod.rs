//! Test execution engine
//!
//! Decides, per batch, whether sibling work units run concurrently or
//! sequentially.

mod parallel;

pub use parallel::{work_unit, ParallelExecutor, WorkUnit};
