use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread::{self, JoinHandle},
};

use futures::{
  channel::{mpsc, oneshot},
  executor::block_on,
  StreamExt,
};
use parking_lot::Mutex;

use super::{ExecutionContext, Task};
use crate::error::{MultiError, RejectedExecution};

/// An execution context backed by a single worker thread.
///
/// Tasks run one at a time, in submission order. After [`shutdown`] or
/// [`shutdown_now`] every submission is rejected.
///
/// [`shutdown`]: SerialExecutor::shutdown
/// [`shutdown_now`]: SerialExecutor::shutdown_now
pub struct SerialExecutor {
  sender: mpsc::UnboundedSender<Task>,
  discard: Arc<AtomicBool>,
  worker: Mutex<Option<JoinHandle<()>>>,
  terminated: Mutex<Option<oneshot::Receiver<()>>>,
}

pub struct SerialExecutorBuilder {
  name: String,
}

impl Default for SerialExecutorBuilder {
  fn default() -> Self { Self { name: "rxmulti-serial".to_string() } }
}

impl SerialExecutorBuilder {
  /// Name of the worker thread.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn build(self) -> std::io::Result<SerialExecutor> {
    let (sender, mut receiver) = mpsc::unbounded::<Task>();
    let (done_tx, done_rx) = oneshot::channel();
    let discard = Arc::new(AtomicBool::new(false));
    let c_discard = discard.clone();
    let name = self.name.clone();
    let worker = thread::Builder::new().name(self.name).spawn(move || {
      block_on(async {
        while let Some(task) = receiver.next().await {
          if c_discard.load(Ordering::Acquire) {
            continue;
          }
          if let Err(err) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            let err = MultiError::from_panic(err);
            tracing::error!(executor = %name, error = %err, "task panicked");
          }
        }
      });
      tracing::debug!(executor = %name, "serial executor terminated");
      let _ = done_tx.send(());
    })?;
    Ok(SerialExecutor {
      sender,
      discard,
      worker: Mutex::new(Some(worker)),
      terminated: Mutex::new(Some(done_rx)),
    })
  }
}

impl SerialExecutor {
  pub fn builder() -> SerialExecutorBuilder { SerialExecutorBuilder::default() }

  pub fn new() -> std::io::Result<Self> { Self::builder().build() }

  /// Stop accepting tasks. Tasks already queued still run.
  pub fn shutdown(&self) { self.sender.close_channel(); }

  /// Stop accepting tasks and drop the ones still queued. The task currently
  /// running, if any, is not interrupted.
  pub fn shutdown_now(&self) {
    self.discard.store(true, Ordering::Release);
    self.sender.close_channel();
  }

  pub fn is_shutdown(&self) -> bool { self.sender.is_closed() }

  /// Block until the worker thread has drained its queue after a shutdown.
  /// Returns immediately if this was already awaited.
  pub fn await_termination(&self) {
    let done = self.terminated.lock().take();
    if let Some(done) = done {
      let _ = block_on(done);
    }
    let worker = self.worker.lock().take();
    if let Some(worker) = worker {
      let _ = worker.join();
    }
  }
}

impl ExecutionContext for SerialExecutor {
  fn submit(&self, task: Task) -> Result<(), RejectedExecution> {
    self.sender.unbounded_send(task).map_err(|_| RejectedExecution::shutdown())
  }

  fn shutdown(&self) { SerialExecutor::shutdown(self) }
}

impl Drop for SerialExecutor {
  fn drop(&mut self) { self.sender.close_channel(); }
}

#[cfg(test)]
mod test {
  use super::*;
  use std::sync::mpsc::channel;

  #[test]
  fn runs_in_order_on_worker_thread() {
    let executor = SerialExecutor::builder().name("serial-test").build().unwrap();
    let order = Arc::new(Mutex::new(vec![]));
    for i in 0..10 {
      let order = order.clone();
      executor
        .submit(Box::new(move || {
          assert_eq!(thread::current().name(), Some("serial-test"));
          order.lock().push(i);
        }))
        .unwrap();
    }
    executor.shutdown();
    executor.await_termination();
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
  }

  #[test]
  fn rejects_after_shutdown() {
    let executor = SerialExecutor::new().unwrap();
    executor.shutdown_now();
    assert!(executor.is_shutdown());
    let err = executor.submit(Box::new(|| {})).unwrap_err();
    assert_eq!(err, RejectedExecution::shutdown());
  }

  #[test]
  fn shutdown_now_drops_queued() {
    let executor = SerialExecutor::new().unwrap();
    let (gate_tx, gate_rx) = channel::<()>();
    let ran = Arc::new(AtomicBool::new(false));
    let c_ran = ran.clone();
    executor
      .submit(Box::new(move || {
        let _ = gate_rx.recv();
      }))
      .unwrap();
    executor.submit(Box::new(move || c_ran.store(true, Ordering::SeqCst))).unwrap();
    executor.shutdown_now();
    let _ = gate_tx.send(());
    executor.await_termination();
    assert!(!ran.load(Ordering::SeqCst));
  }

  #[test]
  fn survives_panicking_task() {
    let executor = SerialExecutor::new().unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let c_ran = ran.clone();
    executor.submit(Box::new(|| panic!("boom"))).unwrap();
    executor.submit(Box::new(move || c_ran.store(true, Ordering::SeqCst))).unwrap();
    executor.shutdown();
    executor.await_termination();
    assert!(ran.load(Ordering::SeqCst));
  }
}
