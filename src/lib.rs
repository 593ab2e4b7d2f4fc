//! # rxmulti: demand-driven reactive streams with subscription-time side effects
//!
//! A [`Multi`] is a cold stream following the Reactive Streams protocol: a
//! subscriber receives exactly one `on_subscribe`, then items bounded by the
//! demand it `request`ed, then at most one terminal signal.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxmulti::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(vec![]));
//! let c_log = log.clone();
//! multi::range(0..3)
//!   .on_subscribe()
//!   .call(|_| Deferred::item("ready"))
//!   .subscribe_all(move |v| c_log.lock().unwrap().push(v), |_| {}, || {});
//! assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Multi`] | A resubscribable stream description |
//! | [`Subscriber`] | Consumes `on_next`, `on_error` and `on_complete` |
//! | [`Subscription`] | Demand (`request`) and cancellation handle |
//! | [`ExecutionContext`] | Where `run_subscription_on` runs its work |
//! | [`Deferred`] | A one-shot asynchronous result |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** (default): `futures::executor::ThreadPool` as an
//!   execution context and as the default executor
//! - **`tokio-scheduler`**: `tokio::runtime::Handle` as an execution context
//!
//! [`Multi`]: multi::Multi
//! [`Subscriber`]: subscriber::Subscriber
//! [`Subscription`]: subscription::Subscription
//! [`ExecutionContext`]: scheduler::ExecutionContext
//! [`Deferred`]: deferred::Deferred

pub mod deferred;
pub mod error;
pub mod multi;
pub mod ops;
pub mod prelude;
pub mod scheduler;
pub mod subscriber;
pub mod subscription;
pub mod testing;
