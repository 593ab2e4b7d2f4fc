//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

pub use crate::{
  deferred::{Deferred, DeferredEmitter, DeferredHandle, IntoDeferred},
  error::{MultiError, RejectedExecution, SideEffectResult},
  multi::{self, BoxedMulti, Multi, MultiExt},
  ops::{OnSubscribe, OnSubscribeCall, OnSubscribeInvoke, RunSubscriptionOn},
  scheduler::{
    default_executor, set_default_executor, shutdown_default_executor, ExecutionContext,
    ImmediateExecutor, SerialExecutor, SharedExecutionContext,
  },
  subscriber::{BoxedSubscriber, FnSubscriber, Subscriber},
  subscription::{BoxedSubscription, Subscription, UNBOUNDED},
};
