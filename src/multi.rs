//! The `Multi` trait and its combinators.
//!
//! A [`Multi`] is a cold, reusable description of a stream: every call to
//! [`Multi::subscribe`] materializes the whole chain again with fresh state.
//!
//! ```rust
//! use rxmulti::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(vec![]));
//! let c_seen = seen.clone();
//! multi::items([1, 2, 3])
//!   .on_subscribe()
//!   .invoke(|_| println!("subscribed"))
//!   .subscribe_all(move |v| c_seen.lock().unwrap().push(v), |_| {}, || {});
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
//! ```

use std::sync::Arc;

use crate::{
  error::MultiError,
  ops::{on_subscribe::OnSubscribe, run_subscription_on::RunSubscriptionOn},
  scheduler::ExecutionContext,
  subscriber::{BoxedSubscriber, FnSubscriber, Subscriber},
};

mod from_iter;
mod trivial;

pub use from_iter::{from_iter, items, range, FromIter};
pub use trivial::{empty, fail_with, Empty, FailWith};

pub trait Multi: Send + Sync {
  type Item: Send + 'static;

  /// Materialize the chain for `subscriber`. Failures are delivered through
  /// `on_error`; nothing is returned or raised here.
  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>);
}

/// Shared, type-erased `Multi`.
pub type BoxedMulti<Item> = Arc<dyn Multi<Item = Item>>;

impl<M> Multi for Arc<M>
where
  M: Multi + ?Sized,
{
  type Item = M::Item;
  #[inline]
  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) { (**self).subscribe(subscriber) }
}

impl<M> Multi for Box<M>
where
  M: Multi + ?Sized,
{
  type Item = M::Item;
  #[inline]
  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) { (**self).subscribe(subscriber) }
}

pub trait MultiExt: Multi + Sized {
  /// Group of operators acting when the upstream subscription arrives.
  fn on_subscribe(self) -> OnSubscribe<Self> { OnSubscribe::new(self) }

  /// Subscribe to the upstream on `context` instead of the calling thread.
  /// Requests and cancellation are routed through `context` too.
  fn run_subscription_on<E>(self, context: E) -> RunSubscriptionOn<Self>
  where
    E: ExecutionContext + 'static,
  {
    RunSubscriptionOn::new(self, Arc::new(context))
  }

  fn boxed(self) -> BoxedMulti<Self::Item>
  where
    Self: 'static,
  {
    Arc::new(self)
  }

  /// Subscribe `subscriber` and hand it back, for inspection.
  fn subscribe_with<S>(&self, subscriber: Arc<S>) -> Arc<S>
  where
    S: Subscriber<Self::Item> + 'static,
  {
    self.subscribe(subscriber.clone());
    subscriber
  }

  /// Subscribe with closures and unbounded demand.
  fn subscribe_all<N, E, C>(&self, on_next: N, on_error: E, on_complete: C)
  where
    N: FnMut(Self::Item) + Send + 'static,
    E: FnOnce(MultiError) + Send + 'static,
    C: FnOnce() + Send + 'static,
  {
    self.subscribe(Arc::new(FnSubscriber::new(on_next, on_error, on_complete)));
  }
}

impl<M: Multi> MultiExt for M {}
