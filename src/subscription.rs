//! The demand/cancellation channel from a subscriber back to its producer.
//!
//! A [`Subscription`] is handed to a subscriber exactly once, through
//! `on_subscribe`. Through it the subscriber grants credit with
//! [`request`](Subscription::request) and stops the flow with
//! [`cancel`](Subscription::cancel).

use std::{
  fmt::{Debug, Formatter},
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};

/// Demand value meaning "no backpressure".
///
/// Adding to it, or any addition that overflows, stays at this value.
pub const UNBOUNDED: u64 = u64::MAX;

pub trait Subscription: Send + Sync {
  /// Grant `n` more items. `n == 0` is a protocol violation the producer
  /// reports as an error.
  fn request(&self, n: u64);

  /// Stop the flow. Idempotent.
  fn cancel(&self);
}

/// Shared, type-erased subscription.
pub type BoxedSubscription = Arc<dyn Subscription>;

impl Debug for dyn Subscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("dyn Subscription").finish_non_exhaustive()
  }
}

/// A subscription that does nothing. Used by producers which terminate
/// right after `on_subscribe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl EmptySubscription {
  pub fn boxed() -> BoxedSubscription { Arc::new(EmptySubscription) }
}

impl Subscription for EmptySubscription {
  #[inline]
  fn request(&self, _n: u64) {}
  #[inline]
  fn cancel(&self) {}
}

/// Saturating demand addition.
#[inline]
pub fn add_cap(a: u64, b: u64) -> u64 { a.saturating_add(b) }

/// Atomically add `n` to `requested`, saturating at [`UNBOUNDED`]. Returns the
/// previous value.
pub fn add_demand(requested: &AtomicU64, n: u64) -> u64 {
  let mut current = requested.load(Ordering::Acquire);
  loop {
    if current == UNBOUNDED {
      return UNBOUNDED;
    }
    match requested.compare_exchange_weak(
      current,
      add_cap(current, n),
      Ordering::AcqRel,
      Ordering::Acquire,
    ) {
      Ok(prev) => return prev,
      Err(actual) => current = actual,
    }
  }
}

/// Atomically subtract `n` emitted items from `requested`. An unbounded
/// demand is left untouched. Returns the remaining demand.
pub fn consume_demand(requested: &AtomicU64, n: u64) -> u64 {
  let mut current = requested.load(Ordering::Acquire);
  loop {
    if current == UNBOUNDED {
      return UNBOUNDED;
    }
    let next = current.saturating_sub(n);
    match requested.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
      Ok(_) => return next,
      Err(actual) => current = actual,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn demand_saturates() {
    let requested = AtomicU64::new(0);
    assert_eq!(add_demand(&requested, 3), 0);
    assert_eq!(add_demand(&requested, UNBOUNDED - 1), 3);
    assert_eq!(requested.load(Ordering::Relaxed), UNBOUNDED);
    assert_eq!(add_demand(&requested, 1), UNBOUNDED);
    assert_eq!(consume_demand(&requested, 10), UNBOUNDED);
  }

  #[test]
  fn consume_bounded() {
    let requested = AtomicU64::new(5);
    assert_eq!(consume_demand(&requested, 2), 3);
    assert_eq!(consume_demand(&requested, 3), 0);
  }
}
