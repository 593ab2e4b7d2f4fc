use std::sync::Arc;

use crate::{
  deferred::IntoDeferred,
  error::{catch_side_effect, MultiError},
  multi::Multi,
  ops::gate::{Resolver, SubscribeHook, SubscriptionGate},
  subscriber::BoxedSubscriber,
  subscription::BoxedSubscription,
};

/// Runs a deferred action when the upstream subscription arrives and waits
/// for it before handing the subscription off.
pub struct OnSubscribeCall<S, F> {
  upstream: S,
  factory: Arc<F>,
}

impl<S, F> Clone for OnSubscribeCall<S, F>
where
  S: Clone,
{
  fn clone(&self) -> Self { Self { upstream: self.upstream.clone(), factory: self.factory.clone() } }
}

impl<S, F> OnSubscribeCall<S, F> {
  /// Build the operator from possibly absent parts.
  ///
  /// Fails with [`MultiError::InvalidArgument`] if either is `None`.
  pub fn new(upstream: Option<S>, factory: Option<F>) -> Result<Self, MultiError> {
    let upstream = upstream.ok_or(MultiError::InvalidArgument("upstream"))?;
    let factory = factory.ok_or(MultiError::InvalidArgument("factory"))?;
    Ok(Self::from_parts(upstream, factory))
  }

  pub(crate) fn from_parts(upstream: S, factory: F) -> Self {
    Self { upstream, factory: Arc::new(factory) }
  }
}

struct CallHook<F> {
  factory: Arc<F>,
}

impl<F, D> SubscribeHook for CallHook<F>
where
  F: Fn(&BoxedSubscription) -> D + Send + Sync + 'static,
  D: IntoDeferred,
{
  fn run(&self, subscription: &BoxedSubscription, resolver: Resolver) {
    match catch_side_effect(|| (self.factory)(subscription)).and_then(D::into_deferred) {
      Ok(Some(deferred)) => {
        let c_resolver = resolver.clone();
        let handle = deferred.subscribe(move |res| c_resolver.resolve(res.map(drop)));
        resolver.attach_deferred(handle);
      }
      Ok(None) => resolver.resolve(Err(MultiError::MissingDeferred)),
      Err(err) => resolver.resolve(Err(err)),
    }
  }
}

impl<S, F, D> Multi for OnSubscribeCall<S, F>
where
  S: Multi,
  F: Fn(&BoxedSubscription) -> D + Send + Sync + 'static,
  D: IntoDeferred,
{
  type Item = S::Item;

  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    let hook = CallHook { factory: self.factory.clone() };
    self.upstream.subscribe(SubscriptionGate::new(subscriber, hook));
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    deferred::{Deferred, DeferredEmitter},
    multi::{self, MultiExt},
    testing::AssertSubscriber,
  };
  use parking_lot::Mutex;
  use std::{
    io,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  };

  #[test]
  fn runs_once_per_subscription() {
    let count = Arc::new(AtomicUsize::new(0));
    let c_count = count.clone();
    let stream = multi::items([1, 2, 3]).on_subscribe().call(move |_| {
      c_count.fetch_add(1, Ordering::SeqCst);
      Deferred::unit()
    });

    stream.subscribe_with(AssertSubscriber::create(10)).assert_items(&[1, 2, 3]).assert_completed();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    stream.subscribe_with(AssertSubscriber::create(10)).assert_items(&[1, 2, 3]).assert_completed();
    assert_eq!(count.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn deferred_failure_fails_stream() {
    multi::items([1, 2, 3])
      .on_subscribe()
      .call(|_| Deferred::<()>::failure(io::Error::new(io::ErrorKind::Other, "boom")))
      .subscribe_with(AssertSubscriber::create(10))
      .assert_no_items()
      .assert_failed_with(|e| e.downcast_ref::<io::Error>().is_some())
      .assert_failed_with_message("boom");
  }

  #[test]
  fn factory_error_fails_stream() {
    multi::items([1, 2, 3])
      .on_subscribe()
      .call(|_| Err::<Deferred<()>, _>(MultiError::msg("boom")))
      .subscribe_with(AssertSubscriber::create(10))
      .assert_no_items()
      .assert_failed_with_message("boom");
  }

  #[test]
  fn factory_panic_fails_stream() {
    multi::items([1, 2, 3])
      .on_subscribe()
      .call(|_| -> Deferred<()> { panic!("boom") })
      .subscribe_with(AssertSubscriber::create(10))
      .assert_failed_with(|e| matches!(e, MultiError::Panicked(_)));
  }

  #[test]
  fn missing_deferred_is_a_null_reference() {
    multi::items([1, 2, 3])
      .on_subscribe()
      .call(|_| Option::<Deferred<()>>::None)
      .subscribe_with(AssertSubscriber::create(10))
      .assert_no_items()
      .assert_failed_with(MultiError::is_null_reference)
      .assert_failed_with_message("`null`");
  }

  #[test]
  fn waits_for_deferred() {
    let slot: Arc<Mutex<Option<DeferredEmitter<i32>>>> = Arc::default();
    let c_slot = slot.clone();
    let subscriber = multi::items([1, 2, 3])
      .on_subscribe()
      .call(move |_| {
        let c_slot = c_slot.clone();
        Deferred::emitter(move |e| *c_slot.lock() = Some(e))
      })
      .subscribe_with(AssertSubscriber::create(3));

    subscriber.assert_not_subscribed().assert_no_items();
    let emitter = slot.lock().take().unwrap();
    emitter.complete(12345);
    subscriber.assert_subscribed().assert_items(&[1, 2, 3]).assert_completed();
  }

  #[test]
  fn cancel_while_pending_disposes_deferred() {
    let disposed = Arc::new(AtomicBool::new(false));
    let c_disposed = disposed.clone();
    let held: Arc<Mutex<Option<BoxedSubscription>>> = Arc::default();
    let c_held = held.clone();
    let subscriber = multi::items([1, 2, 3])
      .on_subscribe()
      .call(move |s| {
        *c_held.lock() = Some(s.clone());
        let c_disposed = c_disposed.clone();
        Deferred::<()>::emitter(move |e| {
          e.on_dispose(move || c_disposed.store(true, Ordering::SeqCst))
        })
      })
      .subscribe_with(AssertSubscriber::create(3));

    held.lock().take().unwrap().cancel();
    assert!(disposed.load(Ordering::SeqCst));
    subscriber.assert_not_subscribed().assert_not_terminated();
  }

  #[test]
  fn absent_parts_are_rejected() {
    type Factory = fn(&BoxedSubscription) -> Deferred<()>;
    let no_factory = OnSubscribeCall::<_, Factory>::new(Some(multi::items([1])), None);
    assert!(matches!(no_factory, Err(MultiError::InvalidArgument("factory"))));

    let factory: Factory = |_| Deferred::unit();
    let no_upstream = OnSubscribeCall::<multi::FromIter<[i32; 1]>, _>::new(None, Some(factory));
    assert!(matches!(no_upstream, Err(MultiError::InvalidArgument("upstream"))));
  }
}
