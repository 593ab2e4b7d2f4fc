use std::sync::Arc;

use crate::{
  error::{catch_side_effect, MultiError, SideEffectResult},
  multi::Multi,
  ops::gate::{Resolver, SubscribeHook, SubscriptionGate},
  subscriber::BoxedSubscriber,
  subscription::BoxedSubscription,
};

/// Runs a synchronous callback when the upstream subscription arrives.
pub struct OnSubscribeInvoke<S, F> {
  upstream: S,
  callback: Arc<F>,
}

impl<S, F> Clone for OnSubscribeInvoke<S, F>
where
  S: Clone,
{
  fn clone(&self) -> Self { Self { upstream: self.upstream.clone(), callback: self.callback.clone() } }
}

impl<S, F> OnSubscribeInvoke<S, F> {
  /// Build the operator from possibly absent parts.
  ///
  /// Fails with [`MultiError::InvalidArgument`] if either is `None`.
  pub fn new(upstream: Option<S>, callback: Option<F>) -> Result<Self, MultiError> {
    let upstream = upstream.ok_or(MultiError::InvalidArgument("upstream"))?;
    let callback = callback.ok_or(MultiError::InvalidArgument("callback"))?;
    Ok(Self::from_parts(upstream, callback))
  }

  pub(crate) fn from_parts(upstream: S, callback: F) -> Self {
    Self { upstream, callback: Arc::new(callback) }
  }
}

struct InvokeHook<F> {
  callback: Arc<F>,
}

impl<F, R> SubscribeHook for InvokeHook<F>
where
  F: Fn(&BoxedSubscription) -> R + Send + Sync + 'static,
  R: SideEffectResult,
{
  fn run(&self, subscription: &BoxedSubscription, resolver: Resolver) {
    let outcome = catch_side_effect(|| (self.callback)(subscription)).and_then(R::into_result);
    resolver.resolve(outcome);
  }
}

impl<S, F, R> Multi for OnSubscribeInvoke<S, F>
where
  S: Multi,
  F: Fn(&BoxedSubscription) -> R + Send + Sync + 'static,
  R: SideEffectResult,
{
  type Item = S::Item;

  fn subscribe(&self, subscriber: BoxedSubscriber<Self::Item>) {
    let hook = InvokeHook { callback: self.callback.clone() };
    self.upstream.subscribe(SubscriptionGate::new(subscriber, hook));
  }
}
