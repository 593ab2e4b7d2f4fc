use std::{
  iter::Peekable,
  ops::Range,
  sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
  },
};

use parking_lot::Mutex;

use crate::{
  error::MultiError,
  multi::Multi,
  subscriber::BoxedSubscriber,
  subscription::{add_demand, consume_demand, EmptySubscription, Subscription, UNBOUNDED},
};

/// Emit the items of `iter`, honouring demand, then complete.
///
/// `iter` is cloned on every subscription.
pub fn from_iter<I>(iter: I) -> FromIter<I>
where
  I: IntoIterator + Clone,
{
  FromIter { iter }
}

/// Emit the given items.
pub fn items<I>(items: I) -> FromIter<I>
where
  I: IntoIterator + Clone,
{
  from_iter(items)
}

/// Emit the numbers of `range`.
pub fn range(range: Range<i64>) -> FromIter<Range<i64>> { from_iter(range) }

#[derive(Clone)]
pub struct FromIter<I> {
  iter: I,
}

impl<I> Multi for FromIter<I>
where
  I: IntoIterator + Clone + Send + Sync,
  I::IntoIter: Send + 'static,
  I::Item: Send + 'static,
{
  type Item = I::Item;

  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    let mut iter = self.iter.clone().into_iter().peekable();
    if iter.peek().is_none() {
      subscriber.on_subscribe(EmptySubscription::boxed());
      subscriber.on_complete();
      return;
    }
    let subscription = Arc::new(IterSubscription {
      iter: Mutex::new(iter),
      requested: AtomicU64::new(0),
      done: AtomicBool::new(false),
      downstream: Mutex::new(Some(subscriber.clone())),
    });
    subscriber.on_subscribe(subscription);
  }
}

struct IterSubscription<It: Iterator> {
  iter: Mutex<Peekable<It>>,
  requested: AtomicU64,
  done: AtomicBool,
  downstream: Mutex<Option<BoxedSubscriber<It::Item>>>,
}

impl<It> IterSubscription<It>
where
  It: Iterator,
{
  fn downstream(&self) -> Option<BoxedSubscriber<It::Item>> { self.downstream.lock().clone() }

  // The first caller to finish gets the downstream, releasing it for good.
  fn finish(&self) -> Option<BoxedSubscriber<It::Item>> {
    if self.done.swap(true, Ordering::AcqRel) {
      return None;
    }
    self.downstream.lock().take()
  }

  // Only one thread drains at a time: the one that moved `requested` away
  // from zero. Re-entrant requests from `on_next` only add demand.
  fn drain(&self) {
    let Some(downstream) = self.downstream() else { return };
    let mut emitted = 0;
    let mut requested = self.requested.load(Ordering::Acquire);
    loop {
      while emitted != requested {
        if self.done.load(Ordering::Acquire) {
          return;
        }
        let next = {
          let mut iter = self.iter.lock();
          match iter.next() {
            Some(item) => Some((item, iter.peek().is_none())),
            None => None,
          }
        };
        match next {
          Some((item, last)) => {
            downstream.on_next(item);
            if last {
              if let Some(downstream) = self.finish() {
                downstream.on_complete();
              }
              return;
            }
          }
          None => {
            if let Some(downstream) = self.finish() {
              downstream.on_complete();
            }
            return;
          }
        }
        if requested != UNBOUNDED {
          emitted += 1;
        }
      }
      requested = self.requested.load(Ordering::Acquire);
      if requested == emitted {
        requested = consume_demand(&self.requested, emitted);
        if requested == 0 {
          return;
        }
        emitted = 0;
      }
    }
  }
}

impl<It> Subscription for IterSubscription<It>
where
  It: Iterator + Send,
  It::Item: Send,
{
  fn request(&self, n: u64) {
    if n == 0 {
      if let Some(downstream) = self.finish() {
        downstream.on_error(MultiError::InvalidDemand(n));
      }
      return;
    }
    if add_demand(&self.requested, n) == 0 {
      self.drain();
    }
  }

  fn cancel(&self) { drop(self.finish()); }
}
