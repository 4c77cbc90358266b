//! Batching through the scheduler: size and deadline triggers, error
//! fan-out, and cleanup of pending batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use kvasir::scheduler::{BatchProducer, RequestScheduler, RequestSpec};
use kvasir::{
    AgeRange, BackoffConfig, BatchConfig, BatchPayload, Category, CoordinatorConfig, Endpoint,
    Entity, KvasirError, Provider, ProviderResponse, RequestType, TasteQuery,
};
use tokio::time::Instant;

fn query(n: u32) -> TasteQuery {
    TasteQuery {
        category: Category::Music,
        interests: vec![format!("interest-{n}")],
        age_range: AgeRange::From25To34,
        location: None,
    }
}

fn spec(n: u32) -> RequestSpec {
    RequestSpec::new(Endpoint::TasteEntities)
        .batchable(BatchPayload::TasteEntities(query(n)))
        .timeout(Duration::from_secs(60))
}

/// Wire executor that echoes each query back as one entity and records
/// batch sizes.
fn echo_wire(calls: Arc<AtomicU32>, sizes: Arc<Mutex<Vec<usize>>>) -> BatchProducer {
    Arc::new(move |payloads| {
        let calls = Arc::clone(&calls);
        let sizes = Arc::clone(&sizes);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            sizes.lock().unwrap().push(payloads.len());
            Ok(payloads
                .into_iter()
                .map(|payload| {
                    let query = payload.into_taste_query();
                    Ok(ProviderResponse::Entities(vec![Entity::new(
                        query.interests[0].clone(),
                        query.interests[0].clone(),
                        0.9,
                    )]))
                })
                .collect())
        })
    })
}

fn batch_config(max_size: usize, delay: Duration) -> CoordinatorConfig {
    CoordinatorConfig::new()
        .batching(BatchConfig::new().max_batch_size(max_size).batch_delay(delay))
        .backoff(BackoffConfig::disabled())
}

#[tokio::test(start_paused = true)]
async fn full_batch_closes_before_the_deadline() {
    let scheduler = Arc::new(RequestScheduler::new(batch_config(
        3,
        Duration::from_secs(10),
    )));
    let calls = Arc::new(AtomicU32::new(0));
    let sizes = Arc::new(Mutex::new(Vec::new()));
    scheduler.register_batch_producer(
        Provider::Taste,
        RequestType::TasteEntities,
        echo_wire(Arc::clone(&calls), Arc::clone(&sizes)),
    );

    let start = Instant::now();
    let mut handles = Vec::new();
    for n in 0..3 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            let producer = never_called();
            scheduler.execute(spec(n), producer).await
        }));
    }
    for (n, handle) in handles.into_iter().enumerate() {
        let entities = handle.await.unwrap().unwrap().expect_entities().unwrap();
        assert_eq!(entities[0].id, format!("interest-{n}"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*sizes.lock().unwrap(), vec![3]);
    // Size trigger, not the 10s deadline.
    assert!(Instant::now() - start < Duration::from_secs(1));
    assert_eq!(scheduler.stats().batched_requests, 3);
}

#[tokio::test(start_paused = true)]
async fn partial_batch_closes_at_the_deadline() {
    let scheduler = Arc::new(RequestScheduler::new(batch_config(
        10,
        Duration::from_millis(100),
    )));
    let calls = Arc::new(AtomicU32::new(0));
    let sizes = Arc::new(Mutex::new(Vec::new()));
    scheduler.register_batch_producer(
        Provider::Taste,
        RequestType::TasteEntities,
        echo_wire(Arc::clone(&calls), Arc::clone(&sizes)),
    );

    let start = Instant::now();
    let mut handles = Vec::new();
    for n in 0..2 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.execute(spec(n), never_called()).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let elapsed = Instant::now() - start;
    assert!(elapsed >= Duration::from_millis(100), "closed at {elapsed:?}");
    assert!(elapsed < Duration::from_millis(200), "closed at {elapsed:?}");
    assert_eq!(*sizes.lock().unwrap(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn wire_failure_fans_out_to_every_caller() {
    let scheduler = Arc::new(RequestScheduler::new(batch_config(
        3,
        Duration::from_secs(10),
    )));
    let wire: BatchProducer = Arc::new(|_payloads| {
        Box::pin(async {
            Err(KvasirError::Upstream {
                status: 502,
                message: "batch endpoint down".into(),
            })
        })
    });
    scheduler.register_batch_producer(Provider::Taste, RequestType::TasteEntities, wire);

    let mut handles = Vec::new();
    for n in 0..3 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.execute(spec(n), never_called()).await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            Err(KvasirError::Upstream { status: 502, .. })
        ));
    }
    assert_eq!(scheduler.stats().rejected_requests, 3);
}

#[tokio::test(start_paused = true)]
async fn cleanup_fails_pending_batch_items_without_a_wire_call() {
    let scheduler = Arc::new(RequestScheduler::new(batch_config(
        10,
        Duration::from_secs(10),
    )));
    let calls = Arc::new(AtomicU32::new(0));
    let sizes = Arc::new(Mutex::new(Vec::new()));
    scheduler.register_batch_producer(
        Provider::Taste,
        RequestType::TasteEntities,
        echo_wire(Arc::clone(&calls), Arc::clone(&sizes)),
    );

    let mut handles = Vec::new();
    for n in 0..2 {
        let scheduler = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            scheduler.execute(spec(n), never_called()).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    scheduler.cleanup();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Err(KvasirError::Cleanup)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn non_eligible_types_bypass_the_batcher() {
    // LLM completions are not in the eligible set, so a batchable hint
    // on one is ignored and the direct producer runs.
    let scheduler = RequestScheduler::new(batch_config(3, Duration::from_secs(10)));
    let calls = Arc::new(AtomicU32::new(0));
    let direct = {
        let calls = Arc::clone(&calls);
        let producer: kvasir::scheduler::Producer = Arc::new(move || {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(ProviderResponse::Ack)
            })
        });
        producer
    };

    let spec = RequestSpec::new(Endpoint::LlmComplete)
        .batchable(BatchPayload::TasteEntities(query(0)))
        .timeout(Duration::from_secs(60));
    let outcome = scheduler.execute(spec, direct).await;

    assert!(outcome.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.stats().batched_requests, 0);
}

/// Producer for batch paths, where the direct producer must never run.
/// Returning a distinctive error makes any accidental invocation fail
/// the assertions on the expected outcomes.
fn never_called() -> kvasir::scheduler::Producer {
    Arc::new(|| {
        Box::pin(async {
            Err(KvasirError::Configuration(
                "direct producer invoked for a batched request".into(),
            ))
        })
    })
}
