//! Recommendation pipelines for the reseller assistant.
//!
//! Three generators (pricing, proactive, scheduling) share one
//! generative-content seam and one cache discipline; the hub runs them
//! concurrently and the executor applies accepted recommendations.

pub mod executor;
pub mod hub;
pub mod llm;
pub mod pricing;
pub mod proactive;
pub mod prompts;
pub mod schedule;

pub use executor::{ActionExecutor, ActionOutcome};
pub use hub::{HubCounts, HubSnapshot, InsightHub, Pipeline};
pub use llm::{CompletionRequest, ContentClient, HttpContentClient, ScriptedContentClient};
pub use pricing::PricingInsightGenerator;
pub use proactive::ProactiveInsightGenerator;
pub use schedule::ScheduleSuggestionGenerator;
