use std::sync::{
  atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
  Arc, Weak,
};

use parking_lot::Mutex;

use crate::{
  error::MultiError,
  multi::Multi,
  scheduler::SharedExecutionContext,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{add_demand, BoxedSubscription, Subscription},
};

/// Subscribes to the upstream on an execution context.
///
/// The downstream's `request` and `cancel` calls are routed through the same
/// context. Whenever the context refuses work, the downstream receives a
/// single [`MultiError::Rejected`] failure; if that happens before the upstream
/// subscription was established, `on_subscribe` is never called.
pub struct RunSubscriptionOn<S> {
  upstream: Arc<S>,
  context: SharedExecutionContext,
}

impl<S> Clone for RunSubscriptionOn<S> {
  fn clone(&self) -> Self { Self { upstream: self.upstream.clone(), context: self.context.clone() } }
}

impl<S> RunSubscriptionOn<S> {
  pub fn new(upstream: S, context: SharedExecutionContext) -> Self {
    Self { upstream: Arc::new(upstream), context }
  }
}

impl<S> Multi for RunSubscriptionOn<S>
where
  S: Multi + 'static,
{
  type Item = S::Item;

  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    let processor = SubscribeOnProcessor::new(subscriber, self.context.clone());
    let upstream = self.upstream.clone();
    let c_processor = processor.clone();
    let scheduled = self.context.submit(Box::new(move || upstream.subscribe(c_processor)));
    if let Err(rejected) = scheduled {
      tracing::debug!(error = %rejected, "subscription could not be scheduled");
      processor.fail(rejected.into());
    }
  }
}

const LIVE: u8 = 0;
const CANCELLED: u8 = 1;
const TERMINATED: u8 = 2;

struct SubscribeOnProcessor<Item> {
  state: AtomicU8,
  subscribed: AtomicBool,
  // set while `on_next` runs; a failure raised meanwhile waits in `failure`
  emitting: AtomicBool,
  failure: Mutex<Option<MultiError>>,
  // demand issued before the upstream subscription was stored
  requested: AtomicU64,
  upstream: Mutex<Option<BoxedSubscription>>,
  downstream: Mutex<Option<BoxedSubscriber<Item>>>,
  context: SharedExecutionContext,
  me: Weak<Self>,
}

impl<Item: Send + 'static> SubscribeOnProcessor<Item> {
  fn new(downstream: BoxedSubscriber<Item>, context: SharedExecutionContext) -> Arc<Self> {
    Arc::new_cyclic(|me| SubscribeOnProcessor {
      state: AtomicU8::new(LIVE),
      subscribed: AtomicBool::new(false),
      emitting: AtomicBool::new(false),
      failure: Mutex::new(None),
      requested: AtomicU64::new(0),
      upstream: Mutex::new(None),
      downstream: Mutex::new(Some(downstream)),
      context,
      me: me.clone(),
    })
  }

  fn is_live(&self) -> bool { self.state.load(Ordering::SeqCst) == LIVE }

  fn upstream(&self) -> Option<BoxedSubscription> { self.upstream.lock().clone() }

  fn downstream(&self) -> Option<BoxedSubscriber<Item>> { self.downstream.lock().clone() }

  fn close(&self, to: u8) -> bool {
    self.state.compare_exchange(LIVE, to, Ordering::SeqCst, Ordering::SeqCst).is_ok()
  }

  fn route_request(&self, upstream: BoxedSubscription, n: u64) {
    if let Err(rejected) = self.context.submit(Box::new(move || upstream.request(n))) {
      tracing::debug!(error = %rejected, n, "request could not be scheduled");
      self.fail(rejected.into());
    }
  }

  fn drain_requested(&self) {
    let Some(upstream) = self.upstream() else { return };
    let n = self.requested.swap(0, Ordering::AcqRel);
    if n > 0 && self.is_live() {
      self.route_request(upstream, n);
    }
  }

  fn fail(&self, err: MultiError) {
    if !self.close(TERMINATED) {
      return;
    }
    // the context is not usable anymore, cancel inline
    if let Some(upstream) = self.upstream.lock().take() {
      upstream.cancel();
    }
    *self.failure.lock() = Some(err);
    if !self.emitting.load(Ordering::SeqCst) {
      self.deliver_failure();
    }
  }

  // Called by `fail` and by the end of `on_next`; the failure goes out once,
  // never while an item is being delivered.
  fn deliver_failure(&self) {
    let Some(err) = self.failure.lock().take() else { return };
    if let Some(downstream) = self.downstream.lock().take() {
      downstream.on_error(err);
    }
  }
}

impl<Item: Send + 'static> Subscription for SubscribeOnProcessor<Item> {
  fn request(&self, n: u64) {
    if !self.is_live() {
      return;
    }
    if let Some(upstream) = self.upstream() {
      self.route_request(upstream, n);
      return;
    }
    if n == 0 {
      // nothing to report the violation to yet
      self.fail(MultiError::InvalidDemand(0));
      return;
    }
    add_demand(&self.requested, n);
    self.drain_requested();
  }

  fn cancel(&self) {
    if !self.close(CANCELLED) {
      return;
    }
    self.downstream.lock().take();
    let Some(upstream) = self.upstream.lock().take() else { return };
    let c_upstream = upstream.clone();
    if self.context.submit(Box::new(move || c_upstream.cancel())).is_err() {
      upstream.cancel();
    }
  }
}

impl<Item: Send + 'static> Subscriber<Item> for SubscribeOnProcessor<Item> {
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    if self.subscribed.swap(true, Ordering::AcqRel) || !self.is_live() {
      subscription.cancel();
      return;
    }
    let (Some(me), Some(downstream)) = (self.me.upgrade(), self.downstream()) else {
      subscription.cancel();
      return;
    };
    downstream.on_subscribe(me);
    *self.upstream.lock() = Some(subscription.clone());
    if !self.is_live() {
      // cancelled or failed from within the downstream's `on_subscribe`
      if self.upstream.lock().take().is_some() {
        subscription.cancel();
      }
      return;
    }
    self.drain_requested();
  }

  fn on_next(&self, item: Item) {
    self.emitting.store(true, Ordering::SeqCst);
    if self.is_live() {
      if let Some(downstream) = self.downstream() {
        downstream.on_next(item);
      }
    }
    self.emitting.store(false, Ordering::SeqCst);
    self.deliver_failure();
  }

  fn on_error(&self, err: MultiError) {
    if !self.close(TERMINATED) {
      return;
    }
    self.upstream.lock().take();
    if let Some(downstream) = self.downstream.lock().take() {
      downstream.on_error(err);
    }
  }

  fn on_complete(&self) {
    if !self.close(TERMINATED) {
      return;
    }
    self.upstream.lock().take();
    if let Some(downstream) = self.downstream.lock().take() {
      downstream.on_complete();
    }
  }
}
