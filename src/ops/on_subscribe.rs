//! Operators reacting to the arrival of the upstream subscription.
//!
//! Obtained through [`MultiExt::on_subscribe`](crate::multi::MultiExt::on_subscribe):
//!
//! - [`invoke`](OnSubscribe::invoke) runs a synchronous callback,
//! - [`call`](OnSubscribe::call) runs a factory producing a [`Deferred`]
//!   and waits for it.
//!
//! Either way the downstream receives `on_subscribe` only after the side
//! effect succeeded; a failing side effect turns into `on_error`.
//!
//! [`Deferred`]: crate::deferred::Deferred

use crate::{
  deferred::IntoDeferred,
  error::SideEffectResult,
  multi::Multi,
  ops::{on_subscribe_call::OnSubscribeCall, on_subscribe_invoke::OnSubscribeInvoke},
  subscription::BoxedSubscription,
};

pub struct OnSubscribe<S> {
  upstream: S,
}

impl<S: Multi> OnSubscribe<S> {
  pub(crate) fn new(upstream: S) -> Self { Self { upstream } }

  /// Run `callback` with the subscription before the downstream sees it.
  ///
  /// The callback may return `()` or `Result<(), E>`; an `Err` or a panic
  /// fails the stream with that error.
  pub fn invoke<F, R>(self, callback: F) -> OnSubscribeInvoke<S, F>
  where
    F: Fn(&BoxedSubscription) -> R + Send + Sync + 'static,
    R: SideEffectResult,
  {
    OnSubscribeInvoke::from_parts(self.upstream, callback)
  }

  /// Run `factory` with the subscription and wait for the deferred action it
  /// returns before the downstream sees the subscription.
  ///
  /// The factory may return a `Deferred`, an `Option` of one, or a `Result`
  /// of either. `None` fails the stream with
  /// [`MultiError::MissingDeferred`](crate::error::MultiError::MissingDeferred).
  pub fn call<F, D>(self, factory: F) -> OnSubscribeCall<S, F>
  where
    F: Fn(&BoxedSubscription) -> D + Send + Sync + 'static,
    D: IntoDeferred,
  {
    OnSubscribeCall::from_parts(self.upstream, factory)
  }
}
