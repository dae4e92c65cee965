//! hrdesk-core - routing and answering for HR questions
//!
//! This crate provides:
//! - Resolution of knowledge-base variants and retrieval modes into immutable settings
//! - A retrieval context provider for the knowledge-base retrieve API
//! - Three specialist agents (benefits, HR policy, perks) that answer from retrieved evidence
//! - A router that classifies each question and delegates it to one specialist

pub mod agents;
pub mod config;
pub mod error;
pub mod intent;
pub mod providers;
pub mod retrieval;
pub mod router;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use agents::{AgentDescriptor, AnswerResult, Citation, SpecialistAgent};
pub use config::{
    DataSource, DataSourceSet, KnowledgeBaseVariant, ReasoningEffort, RetrievalMode,
    RetrievalParameters, Settings, SettingsRequest, VariantTable,
};
pub use error::{Candidate, ConfigurationError, DeskError, Stage};
pub use providers::{ChatMessage, ChatResponse, LlmProvider, OpenAiProvider};
pub use retrieval::{ContextProvider, KnowledgeBaseClient, Passage, RetrievalResult};
pub use router::{
    AmbiguityPolicy, ClassifierKind, DecisionMethod, RoutedAnswer, Router, RouterConfig,
    RoutingDecision,
};
pub use types::{CallOptions, Query, Specialization, Turn};
