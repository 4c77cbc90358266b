//! Scheduler integration: rate-limit admission, single-flight,
//! breaker integration, deadlines, cancellation, and cleanup.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use kvasir::scheduler::{Producer, RequestScheduler, RequestSpec};
use kvasir::types::RequestKey;
use kvasir::{
    BackoffConfig, BreakerConfig, CoordinatorConfig, Endpoint, KvasirError, ProviderResponse,
    RateConfig,
};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn counting(calls: Arc<AtomicU32>) -> Producer {
    Arc::new(move || {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResponse::Ack)
        })
    })
}

fn stamping(calls: Arc<Mutex<Vec<Instant>>>) -> Producer {
    Arc::new(move || {
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            calls.lock().unwrap().push(Instant::now());
            Ok(ProviderResponse::Ack)
        })
    })
}

#[tokio::test(start_paused = true)]
async fn sixth_request_waits_out_the_minute_window() {
    let config = CoordinatorConfig::new()
        .rate(RateConfig::new().requests_per_minute(5).requests_per_hour(1000).burst(10));
    let scheduler = Arc::new(RequestScheduler::new(config));
    let calls = Arc::new(Mutex::new(Vec::new()));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..6 {
        let scheduler = Arc::clone(&scheduler);
        let producer = stamping(Arc::clone(&calls));
        handles.push(tokio::spawn(async move {
            scheduler
                .execute(
                    RequestSpec::new(Endpoint::TasteEntities)
                        .timeout(Duration::from_secs(120)),
                    producer,
                )
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 6);
    let mut offsets: Vec<Duration> = calls.iter().map(|at| *at - start).collect();
    offsets.sort();
    for offset in &offsets[..5] {
        assert!(*offset < Duration::from_millis(50), "early call at {offset:?}");
    }
    assert!(
        offsets[5] >= Duration::from_secs(60) && offsets[5] < Duration::from_secs(61),
        "sixth call at {:?}",
        offsets[5]
    );

    let stats = scheduler.stats();
    assert_eq!(stats.total_requests, 6);
    assert_eq!(stats.accepted_requests, 6);
    assert_eq!(stats.rejected_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_keyed_callers_share_one_producer() {
    let scheduler = Arc::new(RequestScheduler::new(CoordinatorConfig::default()));
    let calls = Arc::new(AtomicU32::new(0));
    let key = RequestKey::fingerprint(Endpoint::TasteEntities, &json!({"q": "shared"}));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..10 {
        let scheduler = Arc::clone(&scheduler);
        let calls = Arc::clone(&calls);
        let producer: Producer = Arc::new(move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(ProviderResponse::Ack)
            })
        });
        handles.push(tokio::spawn(async move {
            scheduler
                .execute(RequestSpec::new(Endpoint::TasteEntities).key(key), producer)
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    // One producer run served all ten callers, in about its own runtime.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Instant::now() - start < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn cached_result_skips_the_producer() {
    let scheduler = RequestScheduler::new(CoordinatorConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let key = RequestKey::fingerprint(Endpoint::TasteEntities, &json!({"q": "cacheable"}));

    for _ in 0..3 {
        scheduler
            .execute(
                RequestSpec::new(Endpoint::TasteEntities).key(key),
                counting(Arc::clone(&calls)),
            )
            .await
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_rejects_without_invoking_producers() {
    let config = CoordinatorConfig::new()
        .breaker(BreakerConfig::new().fail_threshold(2).cooldown(Duration::from_secs(30)))
        .backoff(BackoffConfig::disabled());
    let scheduler = RequestScheduler::new(config);

    let failing: Producer = Arc::new(|| {
        Box::pin(async {
            Err(KvasirError::Upstream {
                status: 500,
                message: "boom".into(),
            })
        })
    });
    for _ in 0..2 {
        let _ = scheduler
            .execute(RequestSpec::new(Endpoint::TasteEntities), failing.clone())
            .await;
    }

    let calls = Arc::new(AtomicU32::new(0));
    let outcome = scheduler
        .execute(
            RequestSpec::new(Endpoint::TasteEntities),
            counting(Arc::clone(&calls)),
        )
        .await;

    assert!(matches!(
        outcome,
        Err(KvasirError::BreakerOpen { retry_in: Some(_) })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn breaker_recovers_through_a_successful_probe() {
    let config = CoordinatorConfig::new()
        .breaker(BreakerConfig::new().fail_threshold(1).cooldown(Duration::from_secs(10)))
        .backoff(BackoffConfig::disabled());
    let scheduler = RequestScheduler::new(config);

    let failing: Producer = Arc::new(|| {
        Box::pin(async {
            Err(KvasirError::Network("connection reset".into()))
        })
    });
    let _ = scheduler
        .execute(RequestSpec::new(Endpoint::LlmComplete), failing)
        .await;

    tokio::time::advance(Duration::from_secs(11)).await;

    let calls = Arc::new(AtomicU32::new(0));
    let outcome = scheduler
        .execute(
            RequestSpec::new(Endpoint::LlmComplete),
            counting(Arc::clone(&calls)),
        )
        .await;
    assert!(outcome.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Closed again: ordinary traffic flows.
    let outcome = scheduler
        .execute(
            RequestSpec::new(Endpoint::LlmComplete),
            counting(Arc::clone(&calls)),
        )
        .await;
    assert!(outcome.is_ok());
}

#[tokio::test(start_paused = true)]
async fn total_deadline_fails_with_timeout() {
    let scheduler = RequestScheduler::new(CoordinatorConfig::default());
    let producer: Producer = Arc::new(|| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(ProviderResponse::Ack)
        })
    });

    let start = Instant::now();
    let outcome = scheduler
        .execute(
            RequestSpec::new(Endpoint::LlmComplete).timeout(Duration::from_millis(200)),
            producer,
        )
        .await;

    assert!(matches!(outcome, Err(KvasirError::Timeout { .. })));
    assert!(Instant::now() - start < Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn cancellation_completes_the_caller_exactly_once() {
    let scheduler = Arc::new(RequestScheduler::new(CoordinatorConfig::default()));
    let token = CancellationToken::new();
    let producer: Producer = Arc::new(|| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ProviderResponse::Ack)
        })
    });

    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let spec = RequestSpec::new(Endpoint::TasteEntities)
            .cancel_token(token.clone())
            .timeout(Duration::from_secs(120));
        tokio::spawn(async move { scheduler.execute(spec, producer).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    let rejected_before = scheduler.stats().rejected_requests;
    token.cancel();

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, Err(KvasirError::Cancelled)));
    // No completion counters are attributed to a cancelled caller.
    assert_eq!(scheduler.stats().rejected_requests, rejected_before);
}

#[tokio::test(start_paused = true)]
async fn cleanup_rejects_in_flight_and_future_work() {
    let scheduler = Arc::new(RequestScheduler::new(CoordinatorConfig::default()));
    let producer: Producer = Arc::new(|| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ProviderResponse::Ack)
        })
    });

    let handle = {
        let scheduler = Arc::clone(&scheduler);
        let spec = RequestSpec::new(Endpoint::TasteEntities).timeout(Duration::from_secs(120));
        let producer = producer.clone();
        tokio::spawn(async move { scheduler.execute(spec, producer).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    scheduler.cleanup();
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, Err(KvasirError::Cleanup)));

    // New work is refused outright.
    let outcome = scheduler
        .execute(RequestSpec::new(Endpoint::TasteEntities), producer)
        .await;
    assert!(matches!(outcome, Err(KvasirError::Cleanup)));

    // Idempotent.
    scheduler.cleanup();
}

#[tokio::test(start_paused = true)]
async fn disabled_coordinator_is_a_pass_through() {
    let scheduler = RequestScheduler::new(CoordinatorConfig::new().enabled(false));
    let calls = Arc::new(AtomicU32::new(0));

    scheduler
        .execute(
            RequestSpec::new(Endpoint::TasteEntities),
            counting(Arc::clone(&calls)),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Pass-through means no admission accounting either.
    assert_eq!(scheduler.stats().total_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn equal_priority_grants_are_fifo() {
    // One-token burst with a 1/s refill forces strictly serialized
    // admissions, exposing the grant order.
    let config = CoordinatorConfig::new().rate(
        RateConfig::new()
            .requests_per_minute(60)
            .requests_per_hour(10_000)
            .burst(1),
    );
    let scheduler = Arc::new(RequestScheduler::new(config));
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for n in 0..4u32 {
        let scheduler = Arc::clone(&scheduler);
        let order = Arc::clone(&order);
        let producer: Producer = Arc::new(move || {
            let order = Arc::clone(&order);
            Box::pin(async move {
                order.lock().unwrap().push(n);
                Ok(ProviderResponse::Ack)
            })
        });
        handles.push(tokio::spawn(async move {
            scheduler
                .execute(
                    RequestSpec::new(Endpoint::TasteEntities)
                        .timeout(Duration::from_secs(60)),
                    producer,
                )
                .await
        }));
        // Deterministic enqueue order under the paused clock.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn high_priority_overtakes_waiting_normal_requests() {
    let config = CoordinatorConfig::new().rate(
        RateConfig::new()
            .requests_per_minute(60)
            .requests_per_hour(10_000)
            .burst(1),
    );
    let scheduler = Arc::new(RequestScheduler::new(config));
    let order = Arc::new(Mutex::new(Vec::new()));

    let submit = |label: &'static str, priority| {
        let scheduler = Arc::clone(&scheduler);
        let order = Arc::clone(&order);
        let producer: Producer = Arc::new(move || {
            let order = Arc::clone(&order);
            Box::pin(async move {
                order.lock().unwrap().push(label);
                Ok(ProviderResponse::Ack)
            })
        });
        tokio::spawn(async move {
            scheduler
                .execute(
                    RequestSpec::new(Endpoint::TasteEntities)
                        .priority(priority)
                        .timeout(Duration::from_secs(60)),
                    producer,
                )
                .await
        })
    };

    // First consumes the only burst token; the next two must wait for
    // the refill and are served by priority, not arrival.
    let first = submit("first", kvasir::Priority::Normal);
    tokio::time::sleep(Duration::from_millis(1)).await;
    let normal = submit("normal", kvasir::Priority::Normal);
    tokio::time::sleep(Duration::from_millis(1)).await;
    let high = submit("high", kvasir::Priority::High);

    for handle in [first, normal, high] {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(*order.lock().unwrap(), vec!["first", "high", "normal"]);
}

#[tokio::test(start_paused = true)]
async fn reset_stats_zeroes_counters() {
    let scheduler = RequestScheduler::new(CoordinatorConfig::default());
    scheduler
        .execute(
            RequestSpec::new(Endpoint::TasteEntities),
            counting(Arc::new(AtomicU32::new(0))),
        )
        .await
        .unwrap();
    assert_eq!(scheduler.stats().total_requests, 1);

    scheduler.reset_stats();
    assert_eq!(scheduler.stats().total_requests, 0);
}
