//! Executors for repeatable units of work.
//!
//! A RoveComm receive loop is one bounded iteration repeated forever. This
//! crate supplies the two ways to repeat it:
//! - [`ContinuousRunner`]: a permanently dedicated thread, for loops that may
//!   block indefinitely on a socket read.
//! - [`WorkerPool`]: a shared pool that re-queues each job after every
//!   iteration, for many lightweight loops with bounded (timed-out) reads.
//!
//! The executors hold closures, not subclassed threads; the engine supplying
//! the work decides nothing about how it is scheduled.

pub mod pool;
pub mod runner;

pub use pool::WorkerPool;
pub use runner::{ContinuousRunner, Flow};
