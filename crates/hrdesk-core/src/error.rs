//! Error taxonomy for the orchestration core
//!
//! Every failure carries the request id and the stage it came from so the
//! caller can decide between retrying, asking the user to rephrase, or giving up.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::types::Specialization;

/// Processing stage a failure originated in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Validation,
    Routing,
    Retrieval,
    Generation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Validation => write!(f, "validation"),
            Self::Routing => write!(f, "routing"),
            Self::Retrieval => write!(f, "retrieval"),
            Self::Generation => write!(f, "generation"),
        }
    }
}

/// Invalid variant, mode or effort. Fatal: raised before any query runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown knowledge base variant '{name}' (expected one of: {})", .known.join(", "))]
    UnknownVariant { name: String, known: Vec<String> },

    #[error("unknown retrieval mode '{name}' (expected one of: {})", .known.join(", "))]
    UnknownMode { name: String, known: Vec<String> },

    #[error("unknown reasoning effort '{name}' (expected one of: low, medium, high)")]
    UnknownEffort { name: String },

    #[error("reasoning effort '{effort}' does not apply to retrieval mode '{mode}'")]
    EffortNotApplicable { mode: String, effort: String },

    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("routing confidence threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Confidence the classifier assigned to one specialization
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub specialization: Specialization,
    pub confidence: f32,
}

/// Errors surfaced by the router and specialist agents
#[derive(Error, Debug)]
pub enum DeskError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("query is empty")]
    EmptyQuery,

    #[error("[{request_id}] knowledge retrieval unavailable for {agent}: {reason}")]
    RetrievalUnavailable {
        request_id: Uuid,
        agent: Specialization,
        reason: String,
    },

    #[error("[{request_id}] knowledge retrieval for {agent} timed out after {after:?}")]
    RetrievalTimeout {
        request_id: Uuid,
        agent: Specialization,
        after: Duration,
    },

    #[error("[{request_id}] language model failed during {stage}{}: {reason}", .agent.map(|a| format!(" for {}", a)).unwrap_or_default())]
    GenerationFailure {
        request_id: Uuid,
        stage: Stage,
        agent: Option<Specialization>,
        reason: String,
    },

    #[error("[{request_id}] no specialist cleared the confidence threshold {threshold:.2} ({})", format_candidates(.candidates))]
    RoutingAmbiguous {
        request_id: Uuid,
        candidates: Vec<Candidate>,
        threshold: f32,
    },

    #[error("[{request_id}] query cancelled during {stage}")]
    Cancelled { request_id: Uuid, stage: Stage },
}

impl DeskError {
    /// Stage the failure originated in
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Configuration,
            Self::EmptyQuery => Stage::Validation,
            Self::RetrievalUnavailable { .. } | Self::RetrievalTimeout { .. } => Stage::Retrieval,
            Self::GenerationFailure { stage, .. } => *stage,
            Self::RoutingAmbiguous { .. } => Stage::Routing,
            Self::Cancelled { stage, .. } => *stage,
        }
    }

    /// Request id of the query that failed, if the failure belongs to one
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Self::Configuration(_) | Self::EmptyQuery => None,
            Self::RetrievalUnavailable { request_id, .. }
            | Self::RetrievalTimeout { request_id, .. }
            | Self::GenerationFailure { request_id, .. }
            | Self::RoutingAmbiguous { request_id, .. }
            | Self::Cancelled { request_id, .. } => Some(*request_id),
        }
    }

    /// Whether the caller may reasonably retry the same query.
    ///
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RetrievalUnavailable { .. }
                | Self::RetrievalTimeout { .. }
                | Self::GenerationFailure { .. }
        )
    }
}

fn format_candidates(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("{}={:.2}", c.specialization, c.confidence))
        .collect::<Vec<_>>()
        .join(", ")
}
