//! Cache + single-flight laws at the component level.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use kvasir::cache::{ResponseCache, SingleFlightCache};
use kvasir::types::RequestKey;
use kvasir::{CacheConfig, Endpoint, KvasirError, ProviderResponse};
use serde_json::json;

fn cache() -> Arc<SingleFlightCache> {
    Arc::new(SingleFlightCache::new(ResponseCache::new(
        &CacheConfig::default(),
    )))
}

fn key(tag: &str) -> RequestKey {
    RequestKey::fingerprint(Endpoint::TasteEntities, &json!({ "tag": tag }))
}

#[tokio::test]
async fn ten_concurrent_callers_one_producer_run() {
    let cache = cache();
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(key("law"), Endpoint::TasteEntities, None, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(ProviderResponse::Ack)
                })
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    // Exactly one invocation, total elapsed about one producer's runtime.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
}

#[tokio::test]
async fn failure_reaches_every_attached_caller_and_stores_nothing() {
    let cache = cache();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(
                    key("fails"),
                    Endpoint::TasteEntities,
                    Some(Duration::from_secs(60)),
                    || async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Err(KvasirError::Upstream {
                            status: 500,
                            message: "producer exploded".into(),
                        })
                    },
                )
                .await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            Err(KvasirError::Upstream { status: 500, .. })
        ));
    }
    assert!(cache.get(key("fails"), Endpoint::TasteEntities).await.is_none());
}

#[tokio::test]
async fn successful_value_is_stored_for_the_ttl() {
    let cache = cache();
    cache
        .get_or_compute(
            key("stores"),
            Endpoint::TasteEntities,
            Some(Duration::from_millis(60)),
            || async { Ok(ProviderResponse::Ack) },
        )
        .await
        .unwrap();

    assert!(cache.get(key("stores"), Endpoint::TasteEntities).await.is_some());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.get(key("stores"), Endpoint::TasteEntities).await.is_none());
}

#[tokio::test]
async fn shutdown_fails_waiters_with_the_given_error() {
    let cache = cache();
    let waiting = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            cache
                .get_or_compute(key("pending"), Endpoint::TasteEntities, None, || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ProviderResponse::Ack)
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    cache.shutdown(KvasirError::Cleanup);
    let outcome = waiting.await.unwrap();
    assert!(matches!(outcome, Err(KvasirError::Cleanup)));
}
