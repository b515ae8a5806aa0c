//! Qualitative package assessments through a local LLM endpoint
//!
//! Seven independent assessments (readme, sentiment, communication,
//! maintenance, changelog, governance, security), each a content fetch plus
//! a JSON-constrained prompt, orchestrated sequentially or in a two-phase
//! parallel fan-out with per-task error isolation.

pub mod assessments;
pub mod client;
pub mod error;
pub mod orchestrator;

pub use client::{extract_json, LlmClient};
pub use error::{LlmError, Result};
pub use orchestrator::{LlmMode, LlmOrchestrator};
