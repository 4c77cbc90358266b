//! Kvasir - Request coordination core for persona generation
//!
//! This crate mediates all outbound calls from a persona-generation
//! service to its two providers — a cultural-recommendations provider
//! (*Taste*) and an LLM — enforcing per-endpoint rate budgets, retrying
//! transient failures with backoff, batching eligible requests, shedding
//! load through per-provider circuit breakers, and caching responses
//! with a single-flight guarantee.
//!
//! # Example
//!
//! ```rust,no_run
//! use kvasir::{AgeRange, Brief, Kvasir, PersonaGateway};
//!
//! #[tokio::main]
//! async fn main() -> kvasir::Result<()> {
//!     let engine = Kvasir::builder()
//!         .taste_credentials("taste-api-key")
//!         .llm_credentials("llm-api-key")
//!         .build()?;
//!
//!     let brief = Brief::builder()
//!         .description("Eco-conscious urban commuters in their thirties")
//!         .interests(["cycling", "sustainability"])
//!         .value("community")
//!         .age_range(AgeRange::From25To34)
//!         .build()?;
//!
//!     let personas = engine.generate(brief).await?;
//!     for persona in &personas {
//!         println!("{} ({:.0}%)", persona.persona.name, persona.metadata.confidence * 100.0);
//!     }
//!     engine.cleanup().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The scheduler ([`scheduler::RequestScheduler`]) integrates the
//! mechanisms and owns the request lifecycle; the provider adapters
//! ([`providers::TasteClient`], [`providers::LlmClient`]) are thin wire
//! translators on top of it; the orchestrator
//! ([`gateway::PersonaEngine`]) runs the Taste → LLM pipeline per
//! persona. Everything callers need is behind the [`PersonaGateway`]
//! trait.

mod batch;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod limiter;
pub mod providers;
mod retry;
pub mod scheduler;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use error::{KvasirError, Result};
pub use gateway::{Kvasir, KvasirBuilder, PersonaEngine};
pub use traits::PersonaGateway;

pub use config::{
    BackoffConfig, BatchConfig, BreakerConfig, CacheConfig, ConfigUpdate, CoordinatorConfig,
    HealthConfig, RateConfig,
};

// Re-export the domain types
pub use types::{
    AgeRange, BatchPayload, Brief, BriefBuilder, Category, CategorySignals, CulturalInsights,
    Endpoint, Entity, GenerationMetadata, LlmCompletion, PersonaDraft, PersonaResult, Priority,
    Provider, ProviderResponse, RequestKey, RequestType, SignalOrigin, TasteQuery, Usage,
};

pub use health::{HealthSnapshot, HealthStatus, Recommendation};
pub use scheduler::{RequestScheduler, RequestSpec, StatsSnapshot};
