//! Integration tests for the `on_subscribe` operators.
//!
//! Side effects gating the subscription, across threads and executors.

use std::{
  io,
  sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc, Mutex,
  },
  thread,
  time::Duration,
};

use futures::{channel::oneshot, executor::ThreadPool};
use rxmulti::{prelude::*, testing::AssertSubscriber};

const TIMEOUT: Duration = Duration::from_secs(5);

#[rxmulti_macro::test]
fn test_invoke_runs_once_per_subscription() {
  let count = Arc::new(AtomicUsize::new(0));
  let seen = Arc::new(Mutex::new(vec![]));
  let c_count = count.clone();
  let c_seen = seen.clone();
  let source = multi::items([1, 2, 3]).on_subscribe().invoke(move |_| {
    let n = c_count.fetch_add(1, Ordering::SeqCst) + 1;
    c_seen.lock().unwrap().push(n);
  });

  source.subscribe_with(AssertSubscriber::create(3)).assert_items(&[1, 2, 3]).assert_completed();
  source.subscribe_with(AssertSubscriber::create(3)).assert_items(&[1, 2, 3]).assert_completed();

  assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}

#[rxmulti_macro::test]
fn test_items_wait_for_blocked_invoke() {
  let (release, latch) = mpsc::channel::<()>();
  let latch = Mutex::new(latch);
  let subscriber = multi::items([1, 2, 3])
    .on_subscribe()
    .invoke(move |s| {
      // demand is already there while the side effect is still blocked
      s.request(3);
      let _ = latch.lock().unwrap().recv();
    })
    .run_subscription_on(default_executor().unwrap())
    .subscribe_with(AssertSubscriber::create(0));

  thread::sleep(Duration::from_millis(50));
  subscriber.assert_not_subscribed().assert_no_items().assert_not_terminated();

  release.send(()).unwrap();
  subscriber.await_completion(TIMEOUT).assert_subscribed().assert_items(&[1, 2, 3]);
}

#[rxmulti_macro::test]
fn test_items_wait_for_deferred_completed_elsewhere() {
  let (emitters, pending) = mpsc::channel::<DeferredEmitter<&'static str>>();
  let emitters = Mutex::new(emitters);
  let subscriber = multi::range(0..3)
    .on_subscribe()
    .call(move |_| {
      let emitters = emitters.lock().unwrap().clone();
      Deferred::emitter(move |e| {
        let _ = emitters.send(e);
      })
    })
    .subscribe_with(AssertSubscriber::create(3));

  subscriber.assert_not_subscribed().assert_no_items();
  let emitter = pending.recv_timeout(TIMEOUT).unwrap();
  thread::spawn(move || emitter.complete("go")).join().unwrap();
  subscriber.await_completion(TIMEOUT).assert_items(&[0, 1, 2]);
}

#[rxmulti_macro::test]
fn test_invoke_failure_reaches_downstream() {
  multi::items([1, 2, 3])
    .on_subscribe()
    .invoke(|_| Err::<(), _>(io::Error::new(io::ErrorKind::Other, "boom")))
    .subscribe_with(AssertSubscriber::create(3))
    .assert_not_subscribed()
    .assert_no_items()
    .assert_failed_with(|e| e.downcast_ref::<io::Error>().is_some())
    .assert_failed_with_message("boom")
    .assert_terminal_count(1);
}

#[rxmulti_macro::test]
fn test_call_failures_reach_downstream() {
  multi::items([1, 2, 3])
    .on_subscribe()
    .call(|_| Deferred::<()>::failure(MultiError::msg("boom")))
    .subscribe_with(AssertSubscriber::create(3))
    .assert_no_items()
    .assert_failed_with_message("boom");

  multi::items([1, 2, 3])
    .on_subscribe()
    .call(|_| Err::<Deferred<()>, _>(MultiError::msg("boom")))
    .subscribe_with(AssertSubscriber::create(3))
    .assert_no_items()
    .assert_failed_with_message("boom");
}

#[rxmulti_macro::test]
fn test_call_without_deferred_fails() {
  multi::items([1, 2, 3])
    .on_subscribe()
    .call(|_| None::<Deferred<()>>)
    .subscribe_with(AssertSubscriber::create(3))
    .assert_no_items()
    .assert_failed_with(MultiError::is_null_reference);
}

#[rxmulti_macro::test]
fn test_absent_parts_fail_at_construction() {
  type Callback = fn(&BoxedSubscription);
  type Factory = fn(&BoxedSubscription) -> Deferred<()>;

  let invoke = OnSubscribeInvoke::<_, Callback>::new(Some(multi::range(0..3)), None);
  assert!(invoke.err().is_some_and(|e| e.is_null_reference()));

  let call = OnSubscribeCall::<_, Factory>::new(Some(multi::range(0..3)), None);
  assert!(call.err().is_some_and(|e| e.is_null_reference()));

  let factory: Factory = |_| Deferred::unit();
  let call = OnSubscribeCall::<multi::FromIter<[i32; 0]>, _>::new(None, Some(factory));
  assert!(matches!(call.err(), Some(MultiError::InvalidArgument("upstream"))));
}

#[rxmulti_macro::test]
fn test_chained_side_effects_run_in_order() {
  let log = Arc::new(Mutex::new(vec![]));
  let (c_first, c_second) = (log.clone(), log.clone());
  multi::items(["a", "b"])
    .on_subscribe()
    .invoke(move |_| c_first.lock().unwrap().push("invoke"))
    .on_subscribe()
    .call(move |_| {
      c_second.lock().unwrap().push("call");
      Deferred::unit()
    })
    .subscribe_with(AssertSubscriber::create(2))
    .assert_items(&["a", "b"])
    .assert_completed();
  assert_eq!(*log.lock().unwrap(), vec!["invoke", "call"]);
}

#[rxmulti_macro::test(shared)]
async fn test_call_with_future_on_thread_pool() {
  let pool = ThreadPool::new().unwrap();
  let (done, completed) = oneshot::channel();
  let seen = Arc::new(Mutex::new(vec![]));
  let c_seen = seen.clone();

  multi::range(0..4)
    .on_subscribe()
    .call(move |_| Deferred::from_future(async { Ok::<_, MultiError>(()) }, pool.clone()))
    .subscribe_all(
      move |v| c_seen.lock().unwrap().push(v),
      |e| panic!("unexpected failure: {e}"),
      move || {
        let _ = done.send(());
      },
    );

  completed.await.unwrap();
  assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[rxmulti_macro::test(shared)]
async fn test_deferred_into_future() {
  let value = Deferred::item(21).map(|v| v * 2).into_future().await.unwrap();
  assert_eq!(value, 42);

  let failed = Deferred::<i32>::failure(MultiError::msg("boom")).into_future().await;
  assert_eq!(failed.unwrap_err().to_string(), "boom");
}
