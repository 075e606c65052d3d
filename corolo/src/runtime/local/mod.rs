//! Scheduler multiplexing ready and delayed handles on the current thread.

pub mod scheduler;
pub use scheduler::Loop;
