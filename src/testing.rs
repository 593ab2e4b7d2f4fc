//! A recording subscriber with fluent assertions.
//!
//! ```rust
//! use rxmulti::{prelude::*, testing::AssertSubscriber};
//!
//! multi::items([1, 2, 3])
//!   .subscribe_with(AssertSubscriber::create(2))
//!   .assert_items(&[1, 2])
//!   .assert_not_terminated()
//!   .request(1)
//!   .assert_items(&[1, 2, 3])
//!   .assert_completed();
//! ```
use std::{
  fmt::Debug,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
  time::{Duration, Instant},
};

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};

use crate::{
  error::MultiError,
  subscriber::Subscriber,
  subscription::{add_cap, add_demand, BoxedSubscription},
};

pub struct AssertSubscriber<T> {
  record: Mutex<Record<T>>,
  changed: Condvar,
  subscription: OnceCell<BoxedSubscription>,
  // requests issued before the subscription arrived
  pending: AtomicU64,
  initial: u64,
  on_next_request: u64,
}

struct Record<T> {
  subscribed: usize,
  items: Vec<T>,
  failures: Vec<MultiError>,
  completions: usize,
}

impl<T> Record<T> {
  fn terminals(&self) -> usize { self.failures.len() + self.completions }
}

impl<T> AssertSubscriber<T> {
  /// Requests `initial` items once subscribed.
  pub fn create(initial: u64) -> Arc<Self> { Self::with(initial, 0) }

  /// Requests `initial` items once subscribed, then `n` more after every item.
  pub fn create_requesting_on_next(initial: u64, n: u64) -> Arc<Self> { Self::with(initial, n) }

  fn with(initial: u64, on_next_request: u64) -> Arc<Self> {
    Arc::new(AssertSubscriber {
      record: Mutex::new(Record { subscribed: 0, items: vec![], failures: vec![], completions: 0 }),
      changed: Condvar::new(),
      subscription: OnceCell::new(),
      pending: AtomicU64::new(0),
      initial,
      on_next_request,
    })
  }

  pub fn request(&self, n: u64) -> &Self {
    match self.subscription.get() {
      Some(subscription) => subscription.request(n),
      None => {
        add_demand(&self.pending, n);
        // the subscription may have arrived meanwhile
        if let Some(subscription) = self.subscription.get() {
          let n = self.pending.swap(0, Ordering::AcqRel);
          if n > 0 {
            subscription.request(n);
          }
        }
      }
    }
    self
  }

  pub fn cancel(&self) -> &Self {
    if let Some(subscription) = self.subscription.get() {
      subscription.cancel();
    }
    self
  }

  pub fn items(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.record.lock().items.clone()
  }

  pub fn failure_message(&self) -> Option<String> {
    self.record.lock().failures.first().map(ToString::to_string)
  }

  #[track_caller]
  pub fn assert_subscribed(&self) -> &Self {
    let subscribed = self.record.lock().subscribed;
    assert_eq!(subscribed, 1, "expected exactly one subscription, got {subscribed}");
    self
  }

  #[track_caller]
  pub fn assert_not_subscribed(&self) -> &Self {
    let subscribed = self.record.lock().subscribed;
    assert_eq!(subscribed, 0, "expected no subscription, got {subscribed}");
    self
  }

  #[track_caller]
  pub fn assert_items(&self, expected: &[T]) -> &Self
  where
    T: PartialEq + Debug,
  {
    assert_eq!(self.record.lock().items, expected);
    self
  }

  #[track_caller]
  pub fn assert_no_items(&self) -> &Self {
    let count = self.record.lock().items.len();
    assert_eq!(count, 0, "expected no items, got {count}");
    self
  }

  #[track_caller]
  pub fn assert_item_count(&self, expected: usize) -> &Self {
    assert_eq!(self.record.lock().items.len(), expected);
    self
  }

  #[track_caller]
  pub fn assert_completed(&self) -> &Self {
    let record = self.record.lock();
    assert!(
      record.completions == 1 && record.failures.is_empty(),
      "expected a completion, got {} completion(s) and failures {:?}",
      record.completions,
      record.failures
    );
    self
  }

  #[track_caller]
  pub fn assert_not_terminated(&self) -> &Self {
    let record = self.record.lock();
    assert!(
      record.terminals() == 0,
      "expected no terminal signal, got {} completion(s) and failures {:?}",
      record.completions,
      record.failures
    );
    self
  }

  #[track_caller]
  pub fn assert_failed_with(&self, predicate: impl FnOnce(&MultiError) -> bool) -> &Self {
    let record = self.record.lock();
    assert_eq!(record.completions, 0, "expected a failure, got a completion");
    match record.failures.first() {
      Some(err) => assert!(predicate(err), "unexpected failure: {err:?}"),
      None => panic!("expected a failure, got none"),
    }
    self
  }

  #[track_caller]
  pub fn assert_failed_with_message(&self, fragment: &str) -> &Self {
    let message = self.failure_message();
    match message {
      Some(message) => {
        assert!(message.contains(fragment), "expected `{fragment}` in failure `{message}`")
      }
      None => panic!("expected a failure containing `{fragment}`, got none"),
    }
    self
  }

  /// Number of terminal signals received, `on_error` and `on_complete` alike.
  #[track_caller]
  pub fn assert_terminal_count(&self, expected: usize) -> &Self {
    assert_eq!(self.record.lock().terminals(), expected);
    self
  }

  #[track_caller]
  pub fn await_subscription(&self, timeout: Duration) -> &Self {
    self.await_until(timeout, "a subscription", |r| r.subscribed > 0)
  }

  #[track_caller]
  pub fn await_item_count(&self, count: usize, timeout: Duration) -> &Self {
    self.await_until(timeout, "items", |r| r.items.len() >= count)
  }

  #[track_caller]
  pub fn await_terminal(&self, timeout: Duration) -> &Self {
    self.await_until(timeout, "a terminal signal", |r| r.terminals() > 0)
  }

  #[track_caller]
  pub fn await_completion(&self, timeout: Duration) -> &Self {
    self.await_terminal(timeout).assert_completed()
  }

  #[track_caller]
  pub fn await_failure(&self, timeout: Duration) -> &Self {
    self.await_until(timeout, "a failure", |r| !r.failures.is_empty())
  }

  #[track_caller]
  fn await_until(
    &self,
    timeout: Duration,
    what: &str,
    done: impl Fn(&Record<T>) -> bool,
  ) -> &Self {
    let deadline = Instant::now() + timeout;
    let mut record = self.record.lock();
    while !done(&record) {
      if self.changed.wait_until(&mut record, deadline).timed_out() && !done(&record) {
        panic!("timed out after {timeout:?} waiting for {what}");
      }
    }
    self
  }

  fn update(&self, f: impl FnOnce(&mut Record<T>)) {
    f(&mut self.record.lock());
    self.changed.notify_all();
  }
}

impl<T: Send + 'static> Subscriber<T> for AssertSubscriber<T> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    if self.subscription.set(subscription.clone()).is_err() {
      subscription.cancel();
      self.update(|r| r.subscribed += 1);
      return;
    }
    self.update(|r| r.subscribed += 1);
    let n = add_cap(self.initial, self.pending.swap(0, Ordering::AcqRel));
    if n > 0 {
      subscription.request(n);
    }
  }

  fn on_next(&self, item: T) {
    self.update(|r| r.items.push(item));
    if self.on_next_request > 0 {
      self.request(self.on_next_request);
    }
  }

  fn on_error(&self, err: MultiError) { self.update(|r| r.failures.push(err)); }

  fn on_complete(&self) { self.update(|r| r.completions += 1); }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::subscription::Subscription;

  #[derive(Default)]
  struct Recorder(Mutex<Vec<u64>>);

  impl Subscription for Recorder {
    fn request(&self, n: u64) { self.0.lock().push(n) }
    fn cancel(&self) {}
  }

  #[test]
  fn pending_requests_are_folded_into_the_first() {
    let subscriber = AssertSubscriber::<i32>::create(2);
    subscriber.request(3);
    let recorder = Arc::new(Recorder::default());
    subscriber.on_subscribe(recorder.clone());
    subscriber.request(1);
    assert_eq!(*recorder.0.lock(), vec![5, 1]);
  }

  #[test]
  #[should_panic(expected = "timed out")]
  fn await_times_out() {
    AssertSubscriber::<i32>::create(0).await_terminal(Duration::from_millis(10));
  }

  #[test]
  fn second_subscription_is_recorded() {
    let subscriber = AssertSubscriber::<i32>::create(0);
    subscriber.on_subscribe(Arc::new(Recorder::default()));
    subscriber.on_subscribe(Arc::new(Recorder::default()));
    assert_eq!(subscriber.record.lock().subscribed, 2);
  }
}
