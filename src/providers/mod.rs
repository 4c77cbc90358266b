//! Provider adapters.
//!
//! This module contains:
//! - The seam traits the orchestrator consumes (`SignalSource`,
//!   `DraftSource`)
//! - Concrete HTTP clients for the two providers (`TasteClient`,
//!   `LlmClient`)
//! - Shared wire plumbing (status mapping, rate-limit header parsing)

pub(crate) mod http;
pub mod llm;
pub mod taste;
pub mod traits;

pub use llm::LlmClient;
pub use taste::TasteClient;
pub use traits::{DraftSource, SignalSource};
