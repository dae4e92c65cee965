//! Shared types for hrdesk-core

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DeskError;

/// Which specialist answers a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Specialization {
    Benefits,
    HrPolicy,
    Perks,
}

impl Specialization {
    /// All specializations, in tie-break order
    pub const ALL: [Specialization; 3] = [Self::Benefits, Self::HrPolicy, Self::Perks];

    /// Stable wire id (e.g. "hr-policy")
    pub fn id(&self) -> &'static str {
        match self {
            Self::Benefits => "benefits",
            Self::HrPolicy => "hr-policy",
            Self::Perks => "perks",
        }
    }

    /// Parse a specialization id. Accepts the "-agent" suffixed forms used by
    /// routing prompts ("benefits-agent") as well.
    pub fn from_id(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        let bare = lower.strip_suffix("-agent").unwrap_or(&lower);
        match bare {
            "benefits" => Some(Self::Benefits),
            "hr-policy" | "hr_policy" | "hrpolicy" | "policy" => Some(Self::HrPolicy),
            "perks" => Some(Self::Perks),
            _ => None,
        }
    }
}

impl std::fmt::Display for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Specialization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s).ok_or_else(|| format!("unknown specialization '{}'", s))
    }
}

/// One prior exchange in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub response: String,
}

/// A user question plus any prior-turn context the caller threads through.
///
/// Construction trims and rejects empty text, so a `Query` that exists is
/// always routable.
#[derive(Debug, Clone)]
pub struct Query {
    id: Uuid,
    text: String,
    history: Vec<Turn>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, DeskError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DeskError::EmptyQuery);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            text: trimmed.to_string(),
            history: Vec::new(),
        })
    }

    /// Attach prior turns, oldest first
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Request id used to correlate logs and errors for this query
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

/// Per-query call controls supplied by the caller
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Deadline applied separately to the retrieval and the completion call
    pub timeout: Duration,
    /// Cancelling drops this query's in-flight requests only
    pub cancel: CancellationToken,
}

impl CallOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
