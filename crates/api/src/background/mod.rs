//! Background work.
//!
//! - [`executor`]: tracked, panic-isolated execution of fire-and-forget
//!   tasks with a bounded drain at shutdown.
//! - [`order_expiry`]: periodic expiry of abandoned pending orders.
//!
//! Long-running loops accept a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! for graceful shutdown.

pub mod executor;
pub mod order_expiry;

pub use executor::{ExecutorError, TaskExecutor};
