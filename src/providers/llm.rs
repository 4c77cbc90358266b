//! LLM provider adapter: text completion with a structured-response
//! parser.
//!
//! The adapter exposes a single completion operation threaded through
//! the scheduler. Draft extraction is defensive: models wrap JSON in
//! prose and code fences, so the parser carves out the outermost JSON
//! object before deserializing. A parse failure earns exactly one
//! corrective re-prompt (with the parse error quoted back to the
//! model); a second failure is fatal.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::http::{classify_status, rate_hints};
use super::traits::DraftSource;
use crate::health::HealthProbe;
use crate::scheduler::{Producer, RequestScheduler, RequestSpec};
use crate::types::{
    Endpoint, LlmCompletion, PersonaDraft, ProviderResponse, RequestKey, Usage,
};
use crate::{KvasirError, Result};

/// Default base URL for the LLM API
const DEFAULT_BASE_URL: &str = "https://api.llm.example";

/// Default completion model.
const DEFAULT_MODEL: &str = "creative-large";

const PROVIDER: &str = "llm";

/// Client for the LLM completion API.
#[derive(Clone)]
pub struct LlmClient {
    scheduler: RequestScheduler,
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
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
        Self {
            scheduler,
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }

    /// Override the completion model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Run one completion through the scheduler.
    pub async fn complete(&self, prompt: &str) -> Result<LlmCompletion> {
        let payload = serde_json::json!({ "model": self.model, "prompt": prompt });
        let key = RequestKey::fingerprint(Endpoint::LlmComplete, &payload);
        let spec = RequestSpec::new(Endpoint::LlmComplete).key(key);
        let producer = self.completion_producer(prompt.to_string());
        self.scheduler
            .execute(spec, producer)
            .await?
            .expect_completion()
    }

    /// One health-endpoint round trip through the scheduler.
    pub async fn probe_once(&self) -> Result<()> {
        let spec = RequestSpec::new(Endpoint::LlmProbe).max_attempts(1);
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
                        format!("llm health returned {status}"),
                        None,
                    ))
                }
            })
        });
        self.scheduler.execute(spec, producer).await.map(|_| ())
    }

    fn completion_producer(&self, prompt: String) -> Producer {
        let http = self.http.clone();
        let url = format!("{}/v1/completions", self.base_url);
        let api_key = self.api_key.clone();
        let scheduler = self.scheduler.clone();
        let model = self.model.clone();
        let max_tokens = self.max_tokens;
        let temperature = self.temperature;
        Arc::new(move || {
            let http = http.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let scheduler = scheduler.clone();
            let model = model.clone();
            let prompt = prompt.clone();
            Box::pin(async move {
                let response = http
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&CompletionRequest {
                        model: &model,
                        prompt: &prompt,
                        max_tokens,
                        temperature,
                    })
                    .send()
                    .await?;
                let hints = rate_hints(response.headers());
                scheduler.note_rate_headers(Endpoint::LlmComplete, &hints);
                let status = response.status();
                if !status.is_success() {
                    return Err(classify_status(
                        PROVIDER,
                        status.as_u16(),
                        format!("llm completion returned {status}"),
                        hints.retry_after,
                    ));
                }
                let body: CompletionResponse = response
                    .json()
                    .await
                    .map_err(|e| KvasirError::ParseInvalid(e.to_string()))?;
                Ok(ProviderResponse::Completion(body.into_completion()))
            })
        })
    }
}

#[async_trait]
impl DraftSource for LlmClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn draft(&self, prompt: &str) -> Result<PersonaDraft> {
        let completion = self.complete(prompt).await?;
        match parse_draft(&completion.text) {
            Ok(draft) => Ok(draft),
            Err(parse_err) => {
                warn!(error = %parse_err, "draft did not parse, re-prompting once");
                let corrected = format!(
                    "{prompt}\n\nYour previous reply could not be parsed ({parse_err}). \
                     Respond again with ONLY the JSON object, no prose and no code fences."
                );
                let completion = self.complete(&corrected).await?;
                parse_draft(&completion.text)
            }
        }
    }
}

#[async_trait]
impl HealthProbe for LlmClient {
    fn endpoint(&self) -> Endpoint {
        Endpoint::LlmProbe
    }

    async fn probe(&self) -> Result<()> {
        self.probe_once().await
    }
}

/// Carve the outermost JSON object out of model text and parse it.
fn parse_draft(text: &str) -> Result<PersonaDraft> {
    let start = text
        .find('{')
        .ok_or_else(|| KvasirError::ParseInvalid("no JSON object in completion".into()))?;
    let end = text
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| KvasirError::ParseInvalid("unterminated JSON object in completion".into()))?;
    serde_json::from_str(&text[start..=end])
        .map_err(|e| KvasirError::ParseInvalid(format!("draft JSON invalid: {e}")))
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

impl CompletionResponse {
    fn into_completion(self) -> LlmCompletion {
        LlmCompletion {
            text: self.text,
            model: self.model,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        }
    }
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
