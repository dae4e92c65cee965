//! Retrieval context provider
//!
//! Agents fetch evidence through [`ContextProvider`]. Implementations must be
//! stateless per call so one instance can serve every agent and every
//! in-flight query concurrently.

pub mod knowledge_base;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{DataSource, DataSourceSet, RetrievalParameters};

pub use knowledge_base::KnowledgeBaseClient;

/// A unit of retrieved evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Citation identifier (source file, URL or document key)
    pub source_id: String,
    pub content: String,
    pub origin: DataSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Ordered passages, best first. Empty means no evidence was found, which is
/// a valid outcome and not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passages: Vec<Passage>,
}

impl RetrievalResult {
    pub fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Distinct source ids in retrieval order
    pub fn source_ids(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for p in &self.passages {
            if !seen.contains(&p.source_id.as_str()) {
                seen.push(p.source_id.as_str());
            }
        }
        seen
    }
}

/// Everything a single retrieval call needs
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub sources: &'a DataSourceSet,
    pub params: &'a RetrievalParameters,
    /// Caller-supplied deadline for this call
    pub timeout: Duration,
}

/// Retrieval backend failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("retrieval backend exceeded deadline of {0:?}")]
    Timeout(Duration),
}

/// Trait every retrieval backend implements
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Human-readable backend name (for logs)
    fn name(&self) -> &str;

    async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<RetrievalResult, RetrievalError>;
}
