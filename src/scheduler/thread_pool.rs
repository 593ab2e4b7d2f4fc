use futures::{
  executor::ThreadPool,
  future::{self, FutureExt},
  task::{FutureObj, Spawn},
};

use super::{ExecutionContext, Task};
use crate::error::RejectedExecution;

impl ExecutionContext for ThreadPool {
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> {
    let f = future::lazy(move |_| task()).boxed();
    self.spawn_obj(FutureObj::new(f)).map_err(|err| {
      tracing::warn!(error = %err, "thread pool refused task");
      RejectedExecution::shutdown()
    })
  }
}
