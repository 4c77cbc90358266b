//! Taste (cultural recommendations) provider adapter.
//!
//! Thin by design: builds the wire messages, threads every call through
//! the scheduler, translates wire errors into the taxonomy, and feeds
//! rate-limit headers back to the limiter. The scheduler owns retries,
//! batching, caching, and the breaker.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{classify_status, rate_hints};
use super::traits::SignalSource;
use crate::health::HealthProbe;
use crate::scheduler::{BatchProducer, Producer, RequestScheduler, RequestSpec};
use crate::types::{
    BatchPayload, Endpoint, Entity, Provider, ProviderResponse, RequestKey, RequestType,
    TasteQuery,
};
use crate::{KvasirError, Result};

/// Default base URL for the Taste API
const DEFAULT_BASE_URL: &str = "https://api.taste.ai";

const PROVIDER: &str = "taste";

/// Client for the Taste insights API.
#[derive(Clone)]
pub struct TasteClient {
    scheduler: RequestScheduler,
    http: Client,
    base_url: String,
    api_key: String,
}

impl TasteClient {
    /// Create a client against the production base URL.
    pub fn new(scheduler: RequestScheduler, http: Client, api_key: impl Into<String>) -> Self {
        Self::with_base_url(scheduler, http, api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        scheduler: RequestScheduler,
        http: Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = Self {
            scheduler,
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        };
        client.register_batch_wire();
        client
    }

    /// Fetch entities for one category query.
    ///
    /// `batch: true` opts in to coalescing with other concurrent
    /// category queries into one wire call (when the configuration
    /// makes the type eligible).
    pub async fn entities(&self, query: TasteQuery, batch: bool) -> Result<Vec<Entity>> {
        let payload = serde_json::to_value(&query)?;
        let key = RequestKey::fingerprint(Endpoint::TasteEntities, &payload);
        let mut spec = RequestSpec::new(Endpoint::TasteEntities).key(key);
        if batch {
            spec = spec.batchable(BatchPayload::TasteEntities(query.clone()));
        }
        let producer = self.entity_producer(query);
        self.scheduler
            .execute(spec, producer)
            .await?
            .expect_entities()
    }

    /// One health-endpoint round trip through the scheduler.
    pub async fn probe_once(&self) -> Result<()> {
        let spec = RequestSpec::new(Endpoint::TasteProbe).max_attempts(1);
        let http = self.http.clone();
        let url = format!("{}/health", self.base_url);
        let api_key = self.api_key.clone();
        let producer: Producer = Arc::new(move || {
            let http = http.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            Box::pin(async move {
                let response = http.get(&url).bearer_auth(&api_key).send().await?;
                let status = response.status();
                if status.is_success() {
                    Ok(ProviderResponse::Ack)
                } else {
                    Err(classify_status(
                        PROVIDER,
                        status.as_u16(),
                        format!("taste health returned {status}"),
                        None,
                    ))
                }
            })
        });
        self.scheduler.execute(spec, producer).await.map(|_| ())
    }

    fn entity_producer(&self, query: TasteQuery) -> Producer {
        let http = self.http.clone();
        let url = format!("{}/v2/insights", self.base_url);
        let api_key = self.api_key.clone();
        let scheduler = self.scheduler.clone();
        Arc::new(move || {
            let http = http.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let scheduler = scheduler.clone();
            let query = query.clone();
            Box::pin(async move {
                let response = http
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&InsightsRequest::from_query(&query))
                    .send()
                    .await?;
                let hints = rate_hints(response.headers());
                scheduler.note_rate_headers(Endpoint::TasteEntities, &hints);
                let status = response.status();
                if !status.is_success() {
                    return Err(classify_status(
                        PROVIDER,
                        status.as_u16(),
                        format!("taste insights returned {status}"),
                        hints.retry_after,
                    ));
                }
                let body: InsightsResponse = response
                    .json()
                    .await
                    .map_err(|e| KvasirError::ParseInvalid(e.to_string()))?;
                Ok(ProviderResponse::Entities(body.into_entities()))
            })
        })
    }

    /// Register the multi-query wire call used when the batcher closes
    /// a group of category lookups.
    fn register_batch_wire(&self) {
        let http = self.http.clone();
        let url = format!("{}/v2/insights/batch", self.base_url);
        let api_key = self.api_key.clone();
        let scheduler = self.scheduler.clone();
        let wire: BatchProducer = Arc::new(move |payloads| {
            let http = http.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let scheduler = scheduler.clone();
            Box::pin(async move {
                let queries: Vec<TasteQuery> = payloads
                    .into_iter()
                    .map(BatchPayload::into_taste_query)
                    .collect();
                let expected = queries.len();
                let wire_queries: Vec<InsightsRequest<'_>> =
                    queries.iter().map(InsightsRequest::from_query).collect();

                let response = http
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&BatchRequest {
                        queries: wire_queries,
                    })
                    .send()
                    .await?;
                let hints = rate_hints(response.headers());
                scheduler.note_rate_headers(Endpoint::TasteEntities, &hints);
                let status = response.status();
                if !status.is_success() {
                    return Err(classify_status(
                        PROVIDER,
                        status.as_u16(),
                        format!("taste batch insights returned {status}"),
                        hints.retry_after,
                    ));
                }

                let body: BatchResponse = response
                    .json()
                    .await
                    .map_err(|e| KvasirError::ParseInvalid(e.to_string()))?;
                let mut outcomes: Vec<Result<ProviderResponse>> = body
                    .results
                    .into_iter()
                    .take(expected)
                    .map(|result| Ok(ProviderResponse::Entities(result.into_entities())))
                    .collect();
                // Positional contract: pad a short response so every
                // caller still completes.
                while outcomes.len() < expected {
                    outcomes.push(Err(KvasirError::ParseInvalid(
                        "batch response shorter than the query list".into(),
                    )));
                }
                Ok(outcomes)
            })
        });
        self.scheduler
            .register_batch_producer(Provider::Taste, RequestType::TasteEntities, wire);
    }
}

#[async_trait]
impl SignalSource for TasteClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn entities(&self, query: TasteQuery, batch: bool) -> Result<Vec<Entity>> {
        TasteClient::entities(self, query, batch).await
    }
}

#[async_trait]
impl HealthProbe for TasteClient {
    fn endpoint(&self) -> Endpoint {
        Endpoint::TasteProbe
    }

    async fn probe(&self) -> Result<()> {
        self.probe_once().await
    }
}

#[derive(Serialize)]
struct InsightsRequest<'a> {
    category: &'a str,
    interests: &'a [String],
    age_range: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

impl<'a> InsightsRequest<'a> {
    fn from_query(query: &'a TasteQuery) -> Self {
        Self {
            category: query.category.as_str(),
            interests: &query.interests,
            age_range: query.age_range.as_str(),
            location: query.location.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    queries: Vec<InsightsRequest<'a>>,
}

#[derive(Deserialize)]
struct InsightsResponse {
    entities: Vec<WireEntity>,
}

impl InsightsResponse {
    fn into_entities(self) -> Vec<Entity> {
        self.entities
            .into_iter()
            .map(|wire| Entity {
                id: wire.id,
                name: wire.name,
                tags: wire.tags,
                confidence: wire.confidence.clamp(0.0, 1.0),
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<InsightsResponse>,
}

#[derive(Deserialize)]
struct WireEntity {
    id: String,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    confidence: f32,
}
