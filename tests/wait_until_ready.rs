use std::future::{ready, Ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use waitready::telemetry::MemorySink;
use waitready::{
    wait_until_ready, ProbeError, RecordingSleeper, RetryBudget, StopReason, Unrecoverable,
    WaitError, WaitEvent, Waiter,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
struct TestError(String);

/// Probe that counts its invocations and answers with `respond(call_number)`.
fn counted<T, F>(counter: &Arc<AtomicUsize>, mut respond: F) -> impl FnMut() -> Ready<T>
where
    F: FnMut(usize) -> T,
{
    let counter = counter.clone();
    move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        ready(respond(n))
    }
}

#[tokio::test(start_paused = true)]
async fn always_failing_probe_is_called_max_attempts_times() {
    let calls = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let err = wait_until_ready(
        counted(&calls, |n| {
            Err::<(), _>(ProbeError::Transient(TestError(format!("call {}", n))))
        }),
        RetryBudget::from_millis(1000, 5).unwrap(),
    )
    .await
    .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    match err {
        WaitError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 5);
            assert_eq!(last, TestError("call 5".into()));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    // timeout / max_attempts = 200ms between attempts; 5 attempts leave 4 gaps, so the wait
    // ends after ~800ms rather than the full 1000ms budget.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(800), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1000), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn succeeds_on_second_call_with_second_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sleeper = RecordingSleeper::new();
    let waiter = Waiter::builder()
        .budget(RetryBudget::from_millis(1000, 5).unwrap())
        .with_sleeper(sleeper.clone())
        .build()
        .unwrap();

    let value = waiter
        .wait_until_ready(counted(&calls, |n| {
            if n < 2 {
                Err(ProbeError::Transient(TestError("not yet".into())))
            } else {
                Ok(format!("value from call {}", n))
            }
        }))
        .await
        .unwrap();

    assert_eq!(value, "value from call 2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sleeper.pauses(), vec![Duration::from_millis(200)]);
}

#[tokio::test]
async fn success_on_attempt_j_calls_probe_j_times() {
    for max_attempts in 1..=6 {
        for j in 1..=max_attempts {
            let calls = Arc::new(AtomicUsize::new(0));
            let outcome = Waiter::builder()
                .budget(RetryBudget::from_millis(60, max_attempts).unwrap())
                .with_sleeper(RecordingSleeper::new())
                .build()
                .unwrap()
                .run(counted(&calls, |n| {
                    if n < j {
                        Err(ProbeError::Transient(TestError(n.to_string())))
                    } else {
                        Ok(n)
                    }
                }))
                .await;

            assert_eq!(outcome.attempts(), j);
            assert_eq!(outcome.into_result().unwrap(), j);
            assert_eq!(calls.load(Ordering::SeqCst), j);
        }
    }
}

#[tokio::test]
async fn unrecoverable_signal_rejects_with_cause_after_one_call() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sleeper = RecordingSleeper::new();
    let waiter = Waiter::builder()
        .budget(RetryBudget::from_millis(1000, 5).unwrap())
        .with_sleeper(sleeper.clone())
        .build()
        .unwrap();

    let err = waiter
        .wait_until_ready(counted(&calls, |_| {
            Err::<(), _>(ProbeError::from(Unrecoverable::caused_by(
                "server is gone",
                TestError("network error".into()),
            )))
        }))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(sleeper.pauses().is_empty(), "no retries may be scheduled");
    assert!(err.is_unrecoverable());
    assert_eq!(err.to_string(), "network error");
    assert!(std::error::Error::source(&err).is_none());
    assert_eq!(err.into_cause(), Some(TestError("network error".into())));
}

#[tokio::test]
async fn unrecoverable_without_cause_rejects_with_signal() {
    let err = Waiter::builder()
        .with_sleeper(RecordingSleeper::new())
        .build()
        .unwrap()
        .wait_until_ready(|| async {
            Err::<(), ProbeError<TestError>>(ProbeError::unrecoverable("exit code 1"))
        })
        .await
        .unwrap_err();

    assert_eq!(err.signal().map(Unrecoverable::message), Some("exit code 1"));
    assert_eq!(err.to_string(), "exit code 1");
}

#[tokio::test(start_paused = true)]
async fn concurrent_invocations_do_not_interfere() {
    let waiter = Waiter::new(RetryBudget::from_millis(1000, 5).unwrap());
    let fast_calls = Arc::new(AtomicUsize::new(0));
    let slow_calls = Arc::new(AtomicUsize::new(0));

    let fast = waiter.run(counted(&fast_calls, |n| {
        if n < 2 {
            Err(ProbeError::Transient(TestError("fast".into())))
        } else {
            Ok("fast")
        }
    }));
    let slow = waiter.run(counted(&slow_calls, |n| {
        Err::<&str, _>(ProbeError::Transient(TestError(format!("slow {}", n))))
    }));

    let (fast, slow) = tokio::join!(fast, slow);

    assert_eq!(fast.reason(), StopReason::Ready);
    assert_eq!(fast.attempts(), 2);
    assert_eq!(fast_calls.load(Ordering::SeqCst), 2);

    assert_eq!(slow.reason(), StopReason::Exhausted);
    assert_eq!(slow.attempts(), 5);
    assert_eq!(slow_calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn settled_event_reports_outcome() {
    let sink = MemorySink::new();
    let waiter = Waiter::builder()
        .budget(RetryBudget::from_millis(30, 3).unwrap())
        .with_sleeper(RecordingSleeper::new())
        .with_sink(sink.clone())
        .label("exhaustion")
        .build()
        .unwrap();

    let _ = waiter
        .run(|| async { Err::<(), _>(ProbeError::Transient(TestError("down".into()))) })
        .await;

    let events = sink.events();
    let started = events
        .iter()
        .filter(|e| matches!(e, WaitEvent::AttemptStarted { .. }))
        .count();
    let scheduled = events
        .iter()
        .filter(|e| matches!(e, WaitEvent::RetryScheduled { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(scheduled, 2);
    assert!(matches!(
        events.last(),
        Some(WaitEvent::Settled { reason: StopReason::Exhausted, attempts: 3, .. })
    ));
}
