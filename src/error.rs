//! Failure types carried by the `on_error` signal.
//!
//! Every failure a stream can observe is a [`MultiError`]. User code plugs its
//! own errors in through [`MultiError::failure`] and can recover the concrete
//! type again with [`MultiError::downcast_ref`].
//!
//! Side-effect closures may or may not be fallible. Both shapes are unified by
//! [`SideEffectResult`], so `|s| { .. }` and `|s| -> Result<(), E> { .. }` are
//! accepted by the same operator.

use std::{any::Any, error::Error, fmt};

/// Boxed user error stored inside [`MultiError::Failure`].
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Why an execution context refused a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
  /// The context was shut down before the work was submitted.
  Shutdown,
}

impl fmt::Display for RejectReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RejectReason::Shutdown => f.write_str("execution context is shut down"),
    }
  }
}

/// A unit of work was refused by an [`ExecutionContext`].
///
/// [`ExecutionContext`]: crate::scheduler::ExecutionContext
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task rejected: {reason}")]
pub struct RejectedExecution {
  reason: RejectReason,
}

impl RejectedExecution {
  pub fn new(reason: RejectReason) -> Self { Self { reason } }

  pub fn shutdown() -> Self { Self::new(RejectReason::Shutdown) }

  pub fn reason(&self) -> RejectReason { self.reason }
}

/// The failure signal of a `Multi`.
#[derive(Debug, thiserror::Error)]
pub enum MultiError {
  /// An operator was built from an absent argument.
  #[error("`{0}` must not be `null`")]
  InvalidArgument(&'static str),

  /// A `call` factory produced no deferred action.
  #[error("the deferred action produced by the `call` factory is `null`")]
  MissingDeferred,

  /// The execution context refused the work needed to keep the stream going.
  #[error(transparent)]
  Rejected(#[from] RejectedExecution),

  /// A subscriber requested a non-positive amount of items.
  #[error("invalid request: {0}, the requested amount must be greater than 0")]
  InvalidDemand(u64),

  /// A side effect panicked while it was running.
  #[error("side effect panicked: {0}")]
  Panicked(String),

  /// Any other failure, usually produced by user code.
  #[error(transparent)]
  Failure(BoxError),
}

impl MultiError {
  /// Wrap an arbitrary error so it can travel as a stream failure.
  pub fn failure<E>(err: E) -> Self
  where
    E: Error + Send + Sync + 'static,
  {
    MultiError::Failure(Box::new(err))
  }

  /// A failure made of a plain message.
  pub fn msg(msg: impl Into<String>) -> Self {
    let msg: String = msg.into();
    MultiError::Failure(msg.into())
  }

  /// Recover the user error wrapped by [`MultiError::failure`].
  pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
    match self {
      MultiError::Failure(inner) => inner.downcast_ref::<E>(),
      _ => None,
    }
  }

  /// `true` when the failure comes from an execution context refusing work.
  pub fn is_rejection(&self) -> bool { matches!(self, MultiError::Rejected(_)) }

  /// `true` when the failure reports an absent value where one was required.
  pub fn is_null_reference(&self) -> bool {
    matches!(self, MultiError::MissingDeferred | MultiError::InvalidArgument(_))
  }

  pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
    let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
      (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
      s.clone()
    } else {
      "unknown panic payload".to_string()
    };
    MultiError::Panicked(msg)
  }
}

impl From<std::io::Error> for MultiError {
  fn from(err: std::io::Error) -> Self { MultiError::failure(err) }
}

impl From<BoxError> for MultiError {
  fn from(err: BoxError) -> Self { MultiError::Failure(err) }
}

/// Unifies the return types a side-effect closure may have.
///
/// Infallible closures return `()`, fallible ones return `Result<(), E>`. The
/// operator only ever sees the converted `Result<(), MultiError>`.
pub trait SideEffectResult {
  fn into_result(self) -> Result<(), MultiError>;
}

impl SideEffectResult for () {
  #[inline]
  fn into_result(self) -> Result<(), MultiError> { Ok(()) }
}

impl<E> SideEffectResult for Result<(), E>
where
  E: Into<MultiError>,
{
  #[inline]
  fn into_result(self) -> Result<(), MultiError> { self.map_err(Into::into) }
}

/// Run a side effect, turning both `Err` returns and panics into a
/// [`MultiError`].
pub(crate) fn catch_side_effect<R>(f: impl FnOnce() -> R) -> Result<R, MultiError> {
  std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(MultiError::from_panic)
}
