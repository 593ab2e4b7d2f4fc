//! Subscriber trait and the closure-based subscriber.
//!
//! A subscriber receives, in order: exactly one `on_subscribe`, any number of
//! `on_next` bounded by the demand it granted, and at most one of
//! `on_error`/`on_complete`.
//!
//! Signals take `&self`: a subscriber is shared between the producer (which
//! emits) and the operator that hands it its subscription, possibly on
//! different threads, so implementations keep their state behind atomics or
//! locks.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
  error::MultiError,
  subscription::{BoxedSubscription, UNBOUNDED},
};

pub trait Subscriber<Item>: Send + Sync {
  fn on_subscribe(&self, subscription: BoxedSubscription);

  fn on_next(&self, item: Item);

  fn on_error(&self, err: MultiError);

  fn on_complete(&self);
}

/// Shared, type-erased subscriber.
pub type BoxedSubscriber<Item> = Arc<dyn Subscriber<Item>>;

impl<Item, S> Subscriber<Item> for Arc<S>
where
  S: Subscriber<Item> + ?Sized,
{
  #[inline]
  fn on_subscribe(&self, subscription: BoxedSubscription) { (**self).on_subscribe(subscription) }
  #[inline]
  fn on_next(&self, item: Item) { (**self).on_next(item) }
  #[inline]
  fn on_error(&self, err: MultiError) { (**self).on_error(err) }
  #[inline]
  fn on_complete(&self) { (**self).on_complete() }
}

/// Subscriber built from three closures. Requests unbounded demand as soon as
/// it is subscribed.
pub struct FnSubscriber<N, E, C> {
  on_next: Mutex<N>,
  on_error: Mutex<Option<E>>,
  on_complete: Mutex<Option<C>>,
  subscription: OnceCell<BoxedSubscription>,
}

impl<N, E, C> FnSubscriber<N, E, C> {
  pub fn new(on_next: N, on_error: E, on_complete: C) -> Self {
    Self {
      on_next: Mutex::new(on_next),
      on_error: Mutex::new(Some(on_error)),
      on_complete: Mutex::new(Some(on_complete)),
      subscription: OnceCell::new(),
    }
  }

  /// Cancel the upstream, if it was handed over already.
  pub fn cancel(&self) {
    if let Some(s) = self.subscription.get() {
      s.cancel();
    }
  }
}

impl<Item, N, E, C> Subscriber<Item> for FnSubscriber<N, E, C>
where
  N: FnMut(Item) + Send,
  E: FnOnce(MultiError) + Send,
  C: FnOnce() + Send,
{
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    if self.subscription.set(subscription.clone()).is_err() {
      subscription.cancel();
      return;
    }
    subscription.request(UNBOUNDED);
  }

  fn on_next(&self, item: Item) { (self.on_next.lock())(item) }

  fn on_error(&self, err: MultiError) {
    self.on_complete.lock().take();
    if let Some(f) = self.on_error.lock().take() {
      f(err)
    }
  }

  fn on_complete(&self) {
    self.on_error.lock().take();
    if let Some(f) = self.on_complete.lock().take() {
      f()
    }
  }
}
