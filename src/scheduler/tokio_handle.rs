use tokio::runtime::Handle;

use super::{ExecutionContext, Task};
use crate::error::RejectedExecution;

/// Tasks are spawned on the runtime's blocking pool, since side effects may
/// block. A runtime that has been shut down drops the task silently; tokio
/// gives no way to observe that at submission time.
impl ExecutionContext for Handle {
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> {
    drop(self.spawn_blocking(task));
    Ok(())
  }
}
