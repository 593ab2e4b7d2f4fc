//! The subscription gate used by the `on_subscribe` operators.
//!
//! A gate sits between an upstream producer and the downstream subscriber.
//! When the upstream subscription arrives the gate runs a side effect
//! ([`SubscribeHook`]) and only exposes itself to the downstream, through
//! `on_subscribe`, once that side effect resolved successfully. If it fails,
//! the upstream is cancelled and the downstream only ever sees `on_error`.
//!
//! Phase and buffered demand live in one atomic word, so every transition is
//! a single compare-and-set and cannot interleave with a concurrent
//! `request`/`cancel`:
//!
//! ```text
//! Uninitialized -> PendingSideEffect -> HandingOff -> Active
//!                        |                  |           |
//!                        v                  v           v
//!                  Terminated(err)      Cancelled   Cancelled / Terminated
//! ```
//!
//! `HandingOff` is the window between `on_subscribe` and the end of the
//! buffered demand replay: demand keeps being buffered, items already flow.

use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc, Weak,
};

use parking_lot::Mutex;

use crate::{
  deferred::DeferredHandle,
  error::MultiError,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{BoxedSubscription, Subscription, UNBOUNDED},
};

/// Observable lifecycle of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
  Uninitialized,
  PendingSideEffect,
  HandingOff,
  Active,
  Cancelled,
  Terminated,
}

const PHASE_SHIFT: u32 = 60;
// Largest buffered demand. Reaching it, by overflow or by an exact request
// of 2^60 - 1, means unbounded: it is replayed as `UNBOUNDED`.
const DEMAND_MASK: u64 = (1 << PHASE_SHIFT) - 1;

impl SubscriptionState {
  fn bits(self) -> u64 {
    let bits = match self {
      SubscriptionState::Uninitialized => 0,
      SubscriptionState::PendingSideEffect => 1,
      SubscriptionState::HandingOff => 2,
      SubscriptionState::Active => 3,
      SubscriptionState::Cancelled => 4,
      SubscriptionState::Terminated => 5,
    };
    bits << PHASE_SHIFT
  }

  fn of(word: u64) -> Self {
    match word >> PHASE_SHIFT {
      0 => SubscriptionState::Uninitialized,
      1 => SubscriptionState::PendingSideEffect,
      2 => SubscriptionState::HandingOff,
      3 => SubscriptionState::Active,
      4 => SubscriptionState::Cancelled,
      _ => SubscriptionState::Terminated,
    }
  }

  fn buffers_demand(self) -> bool {
    matches!(
      self,
      SubscriptionState::Uninitialized
        | SubscriptionState::PendingSideEffect
        | SubscriptionState::HandingOff
    )
  }
}

#[inline]
fn pack(state: SubscriptionState, demand: u64) -> u64 { state.bits() | (demand & DEMAND_MASK) }

#[inline]
fn pending_of(word: u64) -> u64 { word & DEMAND_MASK }

// Buffered demand saturates at `DEMAND_MASK`, replayed as `UNBOUNDED`.
#[inline]
fn add_pending(pending: u64, n: u64) -> u64 { pending.saturating_add(n).min(DEMAND_MASK) }

#[inline]
fn replayed(pending: u64) -> u64 { if pending == DEMAND_MASK { UNBOUNDED } else { pending } }

/// Side effect run by a gate when the upstream subscription arrives.
///
/// The hook must eventually call [`Resolver::resolve`] exactly once, from any
/// thread. `subscription` is the gate itself: demand requested through it is
/// buffered until the handoff, cancelling it withdraws the subscription.
pub trait SubscribeHook: Send + Sync + 'static {
  fn run(&self, subscription: &BoxedSubscription, resolver: Resolver);
}

trait GateControl: Send + Sync {
  fn resolve(&self, outcome: Result<(), MultiError>);
  fn attach_deferred(&self, handle: DeferredHandle);
}

/// Completes the side effect of one gate.
#[derive(Clone)]
pub struct Resolver {
  gate: Arc<dyn GateControl>,
}

impl Resolver {
  /// `Ok` hands the subscription to the downstream, `Err` fails the stream.
  /// Only the first call counts.
  pub fn resolve(&self, outcome: Result<(), MultiError>) { self.gate.resolve(outcome) }

  /// Tie an in-flight deferred action to the gate, so an early cancellation
  /// disposes it.
  pub fn attach_deferred(&self, handle: DeferredHandle) { self.gate.attach_deferred(handle) }
}

enum Terminal {
  Complete,
  Error(MultiError),
}

pub struct SubscriptionGate<Item, H> {
  word: AtomicU64,
  upstream: Mutex<Option<BoxedSubscription>>,
  downstream: Mutex<Option<BoxedSubscriber<Item>>>,
  hook: H,
  deferred: Mutex<Option<DeferredHandle>>,
  pending_terminal: Mutex<Option<Terminal>>,
  terminated: AtomicBool,
  me: Weak<Self>,
}

impl<Item, H> SubscriptionGate<Item, H>
where
  Item: Send + 'static,
  H: SubscribeHook,
{
  pub fn new(downstream: BoxedSubscriber<Item>, hook: H) -> Arc<Self> {
    Arc::new_cyclic(|me| SubscriptionGate {
      word: AtomicU64::new(pack(SubscriptionState::Uninitialized, 0)),
      upstream: Mutex::new(None),
      downstream: Mutex::new(Some(downstream)),
      hook,
      deferred: Mutex::new(None),
      pending_terminal: Mutex::new(None),
      terminated: AtomicBool::new(false),
      me: me.clone(),
    })
  }

  pub fn state(&self) -> SubscriptionState { SubscriptionState::of(self.word.load(Ordering::Acquire)) }

  /// Demand buffered while the side effect is pending. `UNBOUNDED` once it
  /// saturated.
  pub fn pending_demand(&self) -> u64 { replayed(pending_of(self.word.load(Ordering::Acquire))) }

  fn upstream(&self) -> Option<BoxedSubscription> { self.upstream.lock().clone() }

  fn downstream(&self) -> Option<BoxedSubscriber<Item>> { self.downstream.lock().clone() }

  fn on_upstream_subscription(&self, subscription: BoxedSubscription) {
    {
      let mut slot = self.upstream.lock();
      let state = self.state();
      if slot.is_some() || state != SubscriptionState::Uninitialized {
        drop(slot);
        if state != SubscriptionState::Cancelled {
          tracing::warn!(?state, "upstream subscription received twice");
        }
        subscription.cancel();
        return;
      }
      *slot = Some(subscription);
    }
    let mut word = self.word.load(Ordering::Acquire);
    loop {
      if SubscriptionState::of(word) != SubscriptionState::Uninitialized {
        // cancelled while the slot was being filled
        if let Some(up) = self.upstream.lock().take() {
          up.cancel();
        }
        return;
      }
      let next = pack(SubscriptionState::PendingSideEffect, pending_of(word));
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => break,
        Err(actual) => word = actual,
      }
    }
    let Some(me) = self.me.upgrade() else { return };
    let subscription: BoxedSubscription = me.clone();
    self.hook.run(&subscription, Resolver { gate: me });
  }

  fn resolve_success(&self) {
    let mut word = self.word.load(Ordering::Acquire);
    loop {
      let state = SubscriptionState::of(word);
      if state != SubscriptionState::PendingSideEffect {
        tracing::trace!(?state, "side effect resolved after the gate moved on");
        return;
      }
      let next = pack(SubscriptionState::HandingOff, pending_of(word));
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => break,
        Err(actual) => word = actual,
      }
    }
    self.deferred.lock().take();

    let (Some(downstream), Some(me)) = (self.downstream(), self.me.upgrade()) else { return };
    tracing::trace!("side effect resolved, handing the subscription off");
    downstream.on_subscribe(me);

    let mut word = self.word.load(Ordering::Acquire);
    loop {
      if SubscriptionState::of(word) != SubscriptionState::HandingOff {
        return;
      }
      let pending = pending_of(word);
      let (next, replay) = if pending == 0 {
        (pack(SubscriptionState::Active, 0), None)
      } else {
        (pack(SubscriptionState::HandingOff, 0), Some(replayed(pending)))
      };
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => match replay {
          Some(n) => {
            if let Some(up) = self.upstream() {
              up.request(n);
            }
            word = self.word.load(Ordering::Acquire);
          }
          None => break,
        },
        Err(actual) => word = actual,
      }
    }

    let terminal = self.pending_terminal.lock().take();
    if let Some(terminal) = terminal {
      self.deliver_terminal(terminal);
    }
  }

  fn resolve_failure(&self, err: MultiError) {
    let mut word = self.word.load(Ordering::Acquire);
    loop {
      let state = SubscriptionState::of(word);
      if state != SubscriptionState::PendingSideEffect {
        tracing::trace!(?state, error = %err, "side effect failure discarded");
        return;
      }
      let next = pack(SubscriptionState::Terminated, 0);
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => break,
        Err(actual) => word = actual,
      }
    }
    tracing::debug!(error = %err, "side effect failed, cancelling upstream");
    self.deferred.lock().take();
    self.pending_terminal.lock().take();
    if let Some(up) = self.upstream.lock().take() {
      up.cancel();
    }
    if !self.terminated.swap(true, Ordering::AcqRel) {
      if let Some(downstream) = self.downstream.lock().take() {
        downstream.on_error(err);
      }
    }
  }

  fn upstream_terminal(&self, terminal: Terminal) {
    let mut stash = self.pending_terminal.lock();
    let state = self.state();
    match state {
      SubscriptionState::Active => {
        drop(stash);
        self.deliver_terminal(terminal);
      }
      SubscriptionState::Uninitialized
      | SubscriptionState::PendingSideEffect
      | SubscriptionState::HandingOff => {
        if stash.is_none() {
          *stash = Some(terminal);
        }
      }
      SubscriptionState::Cancelled | SubscriptionState::Terminated => {}
    }
  }

  fn deliver_terminal(&self, terminal: Terminal) {
    if self.terminated.swap(true, Ordering::AcqRel) {
      return;
    }
    let mut word = self.word.load(Ordering::Acquire);
    while SubscriptionState::of(word) == SubscriptionState::Active {
      let next = pack(SubscriptionState::Terminated, 0);
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => break,
        Err(actual) => word = actual,
      }
    }
    self.upstream.lock().take();
    let Some(downstream) = self.downstream.lock().take() else { return };
    match terminal {
      Terminal::Complete => downstream.on_complete(),
      Terminal::Error(err) => downstream.on_error(err),
    }
  }
}

impl<Item, H> Subscription for SubscriptionGate<Item, H>
where
  Item: Send + 'static,
  H: SubscribeHook,
{
  fn request(&self, n: u64) {
    if n == 0 {
      // the producer reports the violation
      match self.upstream() {
        Some(up) => up.request(0),
        None if self.state() == SubscriptionState::Uninitialized => {
          tracing::warn!("request(0) before the upstream subscription arrived")
        }
        None => tracing::trace!(state = ?self.state(), "request(0) after the gate closed"),
      }
      return;
    }
    let mut word = self.word.load(Ordering::Acquire);
    loop {
      let state = SubscriptionState::of(word);
      if state == SubscriptionState::Active {
        if let Some(up) = self.upstream() {
          up.request(n);
        }
        return;
      }
      if !state.buffers_demand() {
        return;
      }
      let next = pack(state, add_pending(pending_of(word), n));
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => return,
        Err(actual) => word = actual,
      }
    }
  }

  fn cancel(&self) {
    let mut word = self.word.load(Ordering::Acquire);
    let previous = loop {
      let state = SubscriptionState::of(word);
      if matches!(state, SubscriptionState::Cancelled | SubscriptionState::Terminated) {
        return;
      }
      let next = pack(SubscriptionState::Cancelled, 0);
      match self.word.compare_exchange_weak(word, next, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => break state,
        Err(actual) => word = actual,
      }
    };
    if previous == SubscriptionState::PendingSideEffect {
      tracing::debug!("cancelled while the side effect is pending");
    }
    let deferred = self.deferred.lock().take();
    if let Some(deferred) = deferred {
      deferred.dispose();
    }
    if let Some(up) = self.upstream.lock().take() {
      up.cancel();
    }
    self.pending_terminal.lock().take();
    self.downstream.lock().take();
  }
}

impl<Item, H> GateControl for SubscriptionGate<Item, H>
where
  Item: Send + 'static,
  H: SubscribeHook,
{
  fn resolve(&self, outcome: Result<(), MultiError>) {
    match outcome {
      Ok(()) => self.resolve_success(),
      Err(err) => self.resolve_failure(err),
    }
  }

  fn attach_deferred(&self, handle: DeferredHandle) {
    let mut slot = self.deferred.lock();
    match self.state() {
      SubscriptionState::Uninitialized | SubscriptionState::PendingSideEffect => {
        *slot = Some(handle);
      }
      SubscriptionState::Cancelled => {
        drop(slot);
        handle.dispose();
      }
      _ => {}
    }
  }
}

impl<Item, H> Subscriber<Item> for SubscriptionGate<Item, H>
where
  Item: Send + 'static,
  H: SubscribeHook,
{
  fn on_subscribe(&self, subscription: BoxedSubscription) {
    self.on_upstream_subscription(subscription)
  }

  fn on_next(&self, item: Item) {
    match self.state() {
      SubscriptionState::HandingOff | SubscriptionState::Active => {
        if let Some(downstream) = self.downstream() {
          downstream.on_next(item);
        }
      }
      SubscriptionState::Uninitialized | SubscriptionState::PendingSideEffect => {
        tracing::warn!("item emitted before any demand, dropped");
      }
      SubscriptionState::Cancelled | SubscriptionState::Terminated => {}
    }
  }

  fn on_error(&self, err: MultiError) { self.upstream_terminal(Terminal::Error(err)) }

  fn on_complete(&self) { self.upstream_terminal(Terminal::Complete) }
}
