//! Process-wide default execution context.
//!
//! Nothing in the engine reads this implicitly: callers fetch it with
//! [`default_executor`] and pass it to `run_subscription_on` like any other
//! context.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::{ExecutionContext, SharedExecutionContext, Task};
use crate::error::RejectedExecution;

static DEFAULT_EXECUTOR: Lazy<RwLock<Option<SharedExecutionContext>>> =
  Lazy::new(|| RwLock::new(None));

/// The lazily created default context. Shutting it down releases the
/// backing threads; every later submission is rejected.
struct DefaultExecutor {
  backend: RwLock<Option<Box<dyn ExecutionContext>>>,
}

impl ExecutionContext for DefaultExecutor {
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> {
    match self.backend.read().as_ref() {
      Some(backend) => backend.submit(task),
      None => Err(RejectedExecution::shutdown()),
    }
  }

  fn shutdown(&self) {
    if let Some(backend) = self.backend.write().take() {
      backend.shutdown();
    }
  }
}

#[cfg(feature = "futures-scheduler")]
fn create_backend() -> std::io::Result<Box<dyn ExecutionContext>> {
  let pool = futures::executor::ThreadPool::builder().name_prefix("rxmulti-default-").create()?;
  Ok(Box::new(pool))
}

#[cfg(not(feature = "futures-scheduler"))]
fn create_backend() -> std::io::Result<Box<dyn ExecutionContext>> {
  let executor = super::SerialExecutor::builder().name("rxmulti-default").build()?;
  Ok(Box::new(executor))
}

fn create_default() -> std::io::Result<SharedExecutionContext> {
  let backend = create_backend()?;
  Ok(Arc::new(DefaultExecutor { backend: RwLock::new(Some(backend)) }))
}

/// The default context, created on first use.
pub fn default_executor() -> std::io::Result<SharedExecutionContext> {
  if let Some(ctx) = DEFAULT_EXECUTOR.read().as_ref() {
    return Ok(ctx.clone());
  }
  let mut slot = DEFAULT_EXECUTOR.write();
  if let Some(ctx) = slot.as_ref() {
    return Ok(ctx.clone());
  }
  let ctx = create_default()?;
  tracing::debug!("default execution context initialized");
  *slot = Some(ctx.clone());
  Ok(ctx)
}

/// Replace the default context. Returns the previous one, if any.
pub fn set_default_executor(ctx: SharedExecutionContext) -> Option<SharedExecutionContext> {
  DEFAULT_EXECUTOR.write().replace(ctx)
}

/// Shut the default context down and forget it. Streams still holding it
/// see their work rejected; the next [`default_executor`] call creates a
/// fresh one.
pub fn shutdown_default_executor() -> Option<SharedExecutionContext> {
  let previous = DEFAULT_EXECUTOR.write().take();
  if let Some(ctx) = previous.as_ref() {
    ctx.shutdown();
    tracing::debug!("default execution context shut down");
  }
  previous
}
