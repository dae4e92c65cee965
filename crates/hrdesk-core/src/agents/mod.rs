//! Specialist agents
//!
//! Each agent is an [`AgentDescriptor`] (identity + instructions) bound to the
//! shared retrieval and language-model backends.

pub mod profile;
pub mod prompt;
pub mod specialist;

use serde::Serialize;

use crate::config::DataSource;
use crate::providers::ChatUsage;
use crate::types::Specialization;

pub use profile::AgentDescriptor;
pub use specialist::SpecialistAgent;

/// A source the answer actually relied on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub source_id: String,
    pub origin: DataSource,
}

/// A specialist's answer
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub text: String,
    /// Deduplicated, in retrieval order; empty when nothing was found
    pub citations: Vec<Citation>,
    pub specialization: Specialization,
    /// False when retrieval returned no passages
    pub evidence_found: bool,
    pub usage: ChatUsage,
}
