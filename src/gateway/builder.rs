//! Builder for assembling the coordination core.

use std::sync::Arc;
use std::time::Duration;

use super::engine::PersonaEngine;
use crate::config::CoordinatorConfig;
use crate::health::{HealthMonitor, HealthProbe};
use crate::providers::{DraftSource, LlmClient, SignalSource, TasteClient};
use crate::scheduler::RequestScheduler;
use crate::{KvasirError, Result};

/// Environment variables consulted by [`KvasirBuilder::from_env`].
const ENV_TASTE_KEY: &str = "KVASIR_TASTE_API_KEY";
const ENV_LLM_KEY: &str = "KVASIR_LLM_API_KEY";
const ENV_TASTE_BASE_URL: &str = "KVASIR_TASTE_BASE_URL";
const ENV_LLM_BASE_URL: &str = "KVASIR_LLM_BASE_URL";

/// Main entry point for creating coordination cores.
pub struct Kvasir;

impl Kvasir {
    /// Create a new builder for configuring the core.
    pub fn builder() -> KvasirBuilder {
        KvasirBuilder::new()
    }
}

/// Builder for configuring the coordination core.
///
/// Credentials for both providers are mandatory; `build()` fails with
/// a diagnostic naming both the setter and the environment variable
/// when one is absent.
pub struct KvasirBuilder {
    taste_key: Option<String>,
    llm_key: Option<String>,
    taste_base_url: Option<String>,
    llm_base_url: Option<String>,
    llm_model: Option<String>,
    config: CoordinatorConfig,
    http_timeout: Duration,
    monitor_autostart: bool,
}

impl KvasirBuilder {
    pub fn new() -> Self {
        Self {
            taste_key: None,
            llm_key: None,
            taste_base_url: None,
            llm_base_url: None,
            llm_model: None,
            config: CoordinatorConfig::default(),
            http_timeout: Duration::from_secs(60),
            monitor_autostart: true,
        }
    }

    /// Populate credentials and base URLs from the environment
    /// (`KVASIR_TASTE_API_KEY`, `KVASIR_LLM_API_KEY`, and the optional
    /// `*_BASE_URL` overrides).
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        builder.taste_key = std::env::var(ENV_TASTE_KEY).ok().filter(|k| !k.is_empty());
        builder.llm_key = std::env::var(ENV_LLM_KEY).ok().filter(|k| !k.is_empty());
        builder.taste_base_url = std::env::var(ENV_TASTE_BASE_URL).ok();
        builder.llm_base_url = std::env::var(ENV_LLM_BASE_URL).ok();
        builder
    }

    /// Credential for the Taste provider.
    pub fn taste_credentials(mut self, api_key: impl Into<String>) -> Self {
        self.taste_key = Some(api_key.into());
        self
    }

    /// Credential for the LLM provider.
    pub fn llm_credentials(mut self, api_key: impl Into<String>) -> Self {
        self.llm_key = Some(api_key.into());
        self
    }

    /// Override the Taste base URL (for testing with wiremock).
    pub fn taste_base_url(mut self, url: impl Into<String>) -> Self {
        self.taste_base_url = Some(url.into());
        self
    }

    /// Override the LLM base URL (for testing with wiremock).
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.llm_base_url = Some(url.into());
        self
    }

    /// Override the LLM completion model.
    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = Some(model.into());
        self
    }

    /// Replace the whole coordinator configuration.
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-attempt HTTP client timeout (distinct from request
    /// deadlines, which the scheduler owns). Default: 60s.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Whether `build()` starts the periodic health monitor. Default:
    /// true. Disable in tests that drive probe rounds manually.
    pub fn health_monitor(mut self, autostart: bool) -> Self {
        self.monitor_autostart = autostart;
        self
    }

    /// Assemble the core.
    ///
    /// Must be called within a Tokio runtime when the health monitor
    /// autostart is left on (it spawns the probe task).
    pub fn build(self) -> Result<PersonaEngine> {
        let taste_key = self.taste_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            KvasirError::Configuration(format!(
                "Taste credentials missing: call taste_credentials() or set {ENV_TASTE_KEY}"
            ))
        })?;
        let llm_key = self.llm_key.filter(|k| !k.is_empty()).ok_or_else(|| {
            KvasirError::Configuration(format!(
                "LLM credentials missing: call llm_credentials() or set {ENV_LLM_KEY}"
            ))
        })?;

        let scheduler = RequestScheduler::new(self.config);
        let http = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| KvasirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let taste = match self.taste_base_url {
            Some(url) => TasteClient::with_base_url(scheduler.clone(), http.clone(), taste_key, url),
            None => TasteClient::new(scheduler.clone(), http.clone(), taste_key),
        };
        let mut llm = match self.llm_base_url {
            Some(url) => LlmClient::with_base_url(scheduler.clone(), http.clone(), llm_key, url),
            None => LlmClient::new(scheduler.clone(), http, llm_key),
        };
        if let Some(model) = self.llm_model {
            llm = llm.model(model);
        }

        let probes: Vec<Arc<dyn HealthProbe>> =
            vec![Arc::new(taste.clone()), Arc::new(llm.clone())];
        let monitor = HealthMonitor::new(scheduler.clone(), probes);
        if self.monitor_autostart {
            monitor.start();
        }

        Ok(PersonaEngine::new(
            scheduler,
            Arc::new(taste) as Arc<dyn SignalSource>,
            Arc::new(llm) as Arc<dyn DraftSource>,
            monitor,
        ))
    }
}

impl Default for KvasirBuilder {
    fn default() -> Self {
        Self::new()
    }
}
