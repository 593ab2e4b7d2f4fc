//! Execution contexts: where `run_subscription_on` runs its work.
//!
//! An [`ExecutionContext`] accepts boxed units of work and may refuse them,
//! typically once it has been shut down. The engine never owns or mutates a
//! context; it only submits to it.

use std::sync::Arc;

use crate::error::RejectedExecution;

mod global;
mod serial;
#[cfg(feature = "futures-scheduler")]
mod thread_pool;
#[cfg(feature = "tokio-scheduler")]
mod tokio_handle;

pub use global::{default_executor, set_default_executor, shutdown_default_executor};
pub use serial::{SerialExecutor, SerialExecutorBuilder};

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait ExecutionContext: Send + Sync {
  /// Accept `task` for later execution, or refuse it.
  ///
  /// A refused task is dropped without running.
  fn submit(&self, task: Task) -> Result<(), RejectedExecution>;

  /// Stop accepting work. Contexts without a shutdown notion ignore it.
  fn shutdown(&self) {}
}

/// Shared, type-erased execution context.
pub type SharedExecutionContext = Arc<dyn ExecutionContext>;

impl<E> ExecutionContext for Arc<E>
where
  E: ExecutionContext + ?Sized,
{
  #[inline]
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> { (**self).submit(task) }

  #[inline]
  fn shutdown(&self) { (**self).shutdown() }
}

impl<E> ExecutionContext for &E
where
  E: ExecutionContext + ?Sized,
{
  #[inline]
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> { (**self).submit(task) }

  #[inline]
  fn shutdown(&self) { (**self).shutdown() }
}

/// Runs every task on the submitting thread, right away. Never rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateExecutor;

impl ExecutionContext for ImmediateExecutor {
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> {
    task();
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};

  #[test]
  fn immediate_runs_inline() {
    let ran = Arc::new(AtomicBool::new(false));
    let c_ran = ran.clone();
    ImmediateExecutor.submit(Box::new(move || c_ran.store(true, Ordering::SeqCst))).unwrap();
    assert!(ran.load(Ordering::SeqCst));
  }

  #[test]
  fn arc_forwards() {
    let ctx: SharedExecutionContext = Arc::new(ImmediateExecutor);
    let ran = Arc::new(AtomicBool::new(false));
    let c_ran = ran.clone();
    ctx.submit(Box::new(move || c_ran.store(true, Ordering::SeqCst))).unwrap();
    assert!(ran.load(Ordering::SeqCst));
  }
}
