//! Deferred: a lazy, single-result asynchronous action.
//!
//! A [`Deferred`] does nothing until [`subscribe`](Deferred::subscribe) is
//! called. It then resolves exactly once, with either an item or a
//! [`MultiError`], unless it is disposed first through the returned
//! [`DeferredHandle`]. This is the vehicle `on_subscribe().call(..)` uses for
//! asynchronous side effects.
//!
//! ```rust
//! use rxmulti::prelude::*;
//! use std::sync::mpsc::channel;
//!
//! let (tx, rx) = channel();
//! Deferred::item(3).map(|v| v * 2).subscribe(move |res| tx.send(res.unwrap()).unwrap());
//! assert_eq!(rx.recv().unwrap(), 6);
//! ```

use std::{
  future::Future,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};

use futures::{
  channel::oneshot,
  future::{abortable, Aborted, FutureExt},
  task::{Spawn, SpawnExt},
};
use parking_lot::Mutex;

use crate::error::{catch_side_effect, MultiError, RejectedExecution};

type Callback<T> = Box<dyn FnOnce(Result<T, MultiError>) + Send>;
type DisposeHook = Box<dyn FnOnce() + Send>;

/// A lazy single-result action.
#[must_use = "a deferred action does nothing until it is subscribed"]
pub struct Deferred<T> {
  source: Box<dyn FnOnce(DeferredEmitter<T>) + Send>,
}

enum Phase<T> {
  Waiting { callback: Callback<T>, on_dispose: Vec<DisposeHook> },
  Resolved,
  Disposed,
}

struct Core<T> {
  phase: Mutex<Phase<T>>,
}

impl<T> Core<T> {
  fn resolve(&self, result: Result<T, MultiError>) {
    let callback = {
      let mut phase = self.phase.lock();
      match std::mem::replace(&mut *phase, Phase::Resolved) {
        Phase::Waiting { callback, .. } => callback,
        other => {
          *phase = other;
          return;
        }
      }
    };
    callback(result);
  }

  fn dispose(&self) {
    let hooks = {
      let mut phase = self.phase.lock();
      match std::mem::replace(&mut *phase, Phase::Disposed) {
        Phase::Waiting { on_dispose, .. } => on_dispose,
        other => {
          *phase = other;
          return;
        }
      }
    };
    for hook in hooks {
      hook();
    }
  }
}

/// The producing side of a [`Deferred`] created with
/// [`Deferred::emitter`].
pub struct DeferredEmitter<T> {
  core: Arc<Core<T>>,
}

impl<T> Clone for DeferredEmitter<T> {
  fn clone(&self) -> Self { Self { core: self.core.clone() } }
}

impl<T> DeferredEmitter<T> {
  /// Resolve with an item. Ignored once resolved or disposed.
  pub fn complete(&self, item: T) { self.core.resolve(Ok(item)); }

  /// Resolve with a failure. Ignored once resolved or disposed.
  pub fn fail(&self, err: impl Into<MultiError>) { self.core.resolve(Err(err.into())); }

  pub fn is_disposed(&self) -> bool { matches!(*self.core.phase.lock(), Phase::Disposed) }

  /// Run `hook` when the subscriber disposes the action before it resolved.
  /// Runs right away if that already happened.
  pub fn on_dispose(&self, hook: impl FnOnce() + Send + 'static) {
    let mut phase = self.core.phase.lock();
    match &mut *phase {
      Phase::Waiting { on_dispose, .. } => on_dispose.push(Box::new(hook)),
      Phase::Disposed => {
        drop(phase);
        hook();
      }
      Phase::Resolved => {}
    }
  }
}

/// Returned by [`Deferred::subscribe`]; disposes the action.
pub struct DeferredHandle {
  dispose: Arc<dyn Fn() + Send + Sync>,
  disposed: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Clone for DeferredHandle {
  fn clone(&self) -> Self { Self { dispose: self.dispose.clone(), disposed: self.disposed.clone() } }
}

impl DeferredHandle {
  /// Withdraw interest. The callback will not be invoked afterwards.
  /// Idempotent.
  pub fn dispose(&self) { (self.dispose)() }

  pub fn is_disposed(&self) -> bool { (self.disposed)() }
}

impl std::fmt::Debug for DeferredHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DeferredHandle").field("is_disposed", &self.is_disposed()).finish()
  }
}

impl<T: Send + 'static> Deferred<T> {
  /// Resolve through an emitter handed to `f` at subscription time.
  pub fn emitter<F>(f: F) -> Self
  where
    F: FnOnce(DeferredEmitter<T>) + Send + 'static,
  {
    Deferred { source: Box::new(f) }
  }

  /// Resolve immediately with `item`.
  pub fn item(item: T) -> Self { Self::emitter(move |e| e.complete(item)) }

  /// Resolve immediately with `err`.
  pub fn failure(err: impl Into<MultiError>) -> Self {
    let err = err.into();
    Self::emitter(move |e| e.fail(err))
  }

  /// Drive `fut` on `spawner`. Disposing the action aborts the future.
  pub fn from_future<F, S>(fut: F, spawner: S) -> Self
  where
    F: Future<Output = Result<T, MultiError>> + Send + 'static,
    S: Spawn + Send + 'static,
  {
    Self::emitter(move |emitter| {
      let (fut, abort) = abortable(fut);
      emitter.on_dispose(move || abort.abort());
      let c_emitter = emitter.clone();
      let task = fut.map(move |res| match res {
        Ok(Ok(item)) => c_emitter.complete(item),
        Ok(Err(err)) => c_emitter.fail(err),
        Err(Aborted) => {}
      });
      if let Err(err) = spawner.spawn(task) {
        tracing::warn!(error = %err, "spawning deferred future failed");
        emitter.fail(RejectedExecution::shutdown());
      }
    })
  }

  pub fn map<U, F>(self, f: F) -> Deferred<U>
  where
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    Deferred::emitter(move |emitter: DeferredEmitter<U>| {
      let c_emitter = emitter.clone();
      let handle = self.subscribe(move |res| match res {
        Ok(item) => c_emitter.complete(f(item)),
        Err(err) => c_emitter.fail(err),
      });
      emitter.on_dispose(move || handle.dispose());
    })
  }

  /// Start the action. `callback` receives the single result, unless the
  /// returned handle is disposed first.
  pub fn subscribe<C>(self, callback: C) -> DeferredHandle
  where
    C: FnOnce(Result<T, MultiError>) + Send + 'static,
  {
    let core = Arc::new(Core {
      phase: Mutex::new(Phase::Waiting { callback: Box::new(callback), on_dispose: vec![] }),
    });
    let emitter = DeferredEmitter { core: core.clone() };
    let c_emitter = emitter.clone();
    if let Err(err) = catch_side_effect(move || (self.source)(c_emitter)) {
      emitter.fail(err);
    }
    let c_core = core.clone();
    DeferredHandle {
      dispose: Arc::new(move || c_core.dispose()),
      disposed: Arc::new(move || matches!(*core.phase.lock(), Phase::Disposed)),
    }
  }

  /// Await the result. Dropping the future disposes the action.
  pub fn into_future(self) -> DeferredFuture<T> {
    let (tx, rx) = oneshot::channel();
    let handle = self.subscribe(move |res| {
      let _ = tx.send(res);
    });
    DeferredFuture { rx, handle }
  }
}

impl Deferred<()> {
  /// Resolve immediately with `()`.
  pub fn unit() -> Self { Self::item(()) }
}

/// Future returned by [`Deferred::into_future`].
pub struct DeferredFuture<T> {
  rx: oneshot::Receiver<Result<T, MultiError>>,
  handle: DeferredHandle,
}

impl<T> Future for DeferredFuture<T> {
  type Output = Result<T, MultiError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    self.rx.poll_unpin(cx).map(|res| {
      res.unwrap_or_else(|_| Err(MultiError::msg("deferred action dropped before resolving")))
    })
  }
}

impl<T> Drop for DeferredFuture<T> {
  fn drop(&mut self) { self.handle.dispose(); }
}

/// What a `call` factory may return: a [`Deferred`], optionally absent,
/// optionally fallible.
pub trait IntoDeferred {
  type Item: Send + 'static;

  fn into_deferred(self) -> Result<Option<Deferred<Self::Item>>, MultiError>;
}

impl<T: Send + 'static> IntoDeferred for Deferred<T> {
  type Item = T;
  #[inline]
  fn into_deferred(self) -> Result<Option<Deferred<T>>, MultiError> { Ok(Some(self)) }
}

impl<T: Send + 'static> IntoDeferred for Option<Deferred<T>> {
  type Item = T;
  #[inline]
  fn into_deferred(self) -> Result<Option<Deferred<T>>, MultiError> { Ok(self) }
}

impl<T: Send + 'static, E: Into<MultiError>> IntoDeferred for Result<Deferred<T>, E> {
  type Item = T;
  #[inline]
  fn into_deferred(self) -> Result<Option<Deferred<T>>, MultiError> {
    self.map(Some).map_err(Into::into)
  }
}

impl<T: Send + 'static, E: Into<MultiError>> IntoDeferred for Result<Option<Deferred<T>>, E> {
  type Item = T;
  #[inline]
  fn into_deferred(self) -> Result<Option<Deferred<T>>, MultiError> { self.map_err(Into::into) }
}

#[cfg(test)]
mod test {
  use super::*;
  use futures::executor::{block_on, ThreadPool};
  use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc::channel,
  };

  #[test]
  fn item_resolves_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c_calls = calls.clone();
    let handle = Deferred::item(1).subscribe(move |res| {
      assert_eq!(res.unwrap(), 1);
      c_calls.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    handle.dispose();
    assert!(!handle.is_disposed());
  }

  #[test]
  fn emitter_ignores_second_resolution() {
    let slot = Arc::new(Mutex::new(None));
    let c_slot = slot.clone();
    let results = Arc::new(Mutex::new(vec![]));
    let c_results = results.clone();
    Deferred::emitter(move |e| *c_slot.lock() = Some(e))
      .subscribe(move |res: Result<i32, MultiError>| c_results.lock().push(res.is_ok()));
    let emitter = slot.lock().take().unwrap();
    emitter.complete(1);
    emitter.fail(MultiError::msg("late"));
    assert_eq!(*results.lock(), vec![true]);
  }

  #[test]
  fn dispose_suppresses_callback_and_runs_hooks() {
    let slot = Arc::new(Mutex::new(None));
    let c_slot = slot.clone();
    let hooked = Arc::new(AtomicBool::new(false));
    let c_hooked = hooked.clone();
    let called = Arc::new(AtomicBool::new(false));
    let c_called = called.clone();
    let handle = Deferred::emitter(move |e: DeferredEmitter<i32>| {
      e.on_dispose(move || c_hooked.store(true, Ordering::SeqCst));
      *c_slot.lock() = Some(e);
    })
    .subscribe(move |_| c_called.store(true, Ordering::SeqCst));

    handle.dispose();
    handle.dispose();
    assert!(handle.is_disposed());
    assert!(hooked.load(Ordering::SeqCst));

    let emitter = slot.lock().take().unwrap();
    assert!(emitter.is_disposed());
    emitter.complete(1);
    assert!(!called.load(Ordering::SeqCst));
  }

  #[test]
  fn panicking_source_fails() {
    let (tx, rx) = channel();
    Deferred::<i32>::emitter(|_| panic!("boom")).subscribe(move |res| tx.send(res).unwrap());
    match rx.recv().unwrap() {
      Err(MultiError::Panicked(msg)) => assert_eq!(msg, "boom"),
      other => panic!("unexpected: {other:?}"),
    }
  }

  #[test]
  fn from_future_on_pool() {
    let pool = ThreadPool::new().unwrap();
    let res = block_on(Deferred::from_future(async { Ok(21) }, pool).map(|v| v * 2).into_future());
    assert_eq!(res.unwrap(), 42);
  }

  #[test]
  fn failure_through_future() {
    let res = block_on(Deferred::<()>::failure(MultiError::msg("boom")).into_future());
    assert_eq!(res.unwrap_err().to_string(), "boom");
  }

  #[test]
  fn into_deferred_shapes() {
    assert!(Deferred::unit().into_deferred().unwrap().is_some());
    assert!(Option::<Deferred<()>>::None.into_deferred().unwrap().is_none());
    let failed: Result<Deferred<()>, MultiError> = Err(MultiError::msg("boom"));
    assert!(failed.into_deferred().is_err());
  }
}
