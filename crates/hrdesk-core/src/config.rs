//! Knowledge base variants and retrieval modes
//!
//! Resolves the user-facing variant/mode names into the concrete data-source
//! set and retrieval parameters every agent shares. Resolution is a pure lookup
//! over a static table, done once at startup so a bad name fails before the
//! first query instead of in the middle of a conversation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;

/// Corpora a retrieval call may draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// The indexed HR document corpus
    BaseDocuments,
    /// Live web search
    Web,
    /// Enterprise content (SharePoint)
    Enterprise,
}

impl DataSource {
    /// Name the retrieval backend knows this source by
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::BaseDocuments => "searchIndex",
            Self::Web => "web",
            Self::Enterprise => "remoteSharePoint",
        }
    }

    /// Map a backend reference type back to a source. Unknown types are
    /// attributed to the base corpus.
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "web" => Self::Web,
            "remoteSharePoint" | "indexedSharePoint" | "sharepoint" => Self::Enterprise,
            _ => Self::BaseDocuments,
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BaseDocuments => write!(f, "documents"),
            Self::Web => write!(f, "web"),
            Self::Enterprise => write!(f, "sharepoint"),
        }
    }
}

/// Closed set of knowledge base configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnowledgeBaseVariant {
    Base,
    WithSharepoint,
    WithWeb,
    WithWebAndSharepoint,
}

impl KnowledgeBaseVariant {
    pub const ALL: [KnowledgeBaseVariant; 4] = [
        Self::Base,
        Self::WithSharepoint,
        Self::WithWeb,
        Self::WithWebAndSharepoint,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::WithSharepoint => "with-sharepoint",
            Self::WithWeb => "with-web",
            Self::WithWebAndSharepoint => "with-web-and-sharepoint",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|v| v.name() == lower)
    }

    fn sources(&self) -> Vec<DataSource> {
        match self {
            Self::Base => vec![DataSource::BaseDocuments],
            Self::WithSharepoint => vec![DataSource::BaseDocuments, DataSource::Enterprise],
            Self::WithWeb => vec![DataSource::BaseDocuments, DataSource::Web],
            Self::WithWebAndSharepoint => vec![
                DataSource::BaseDocuments,
                DataSource::Web,
                DataSource::Enterprise,
            ],
        }
    }

    fn default_knowledge_base(&self) -> &'static str {
        match self {
            Self::Base => "gptkbindex-agent-upgrade",
            Self::WithSharepoint => "gptkbindex-agent-upgrade-with-sp",
            Self::WithWeb => "gptkbindex-agent-upgrade-with-web",
            Self::WithWebAndSharepoint => "gptkbindex-agent-upgrade-with-web-and-sp",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Base => "HR knowledge base with employee handbook, benefits, and policies",
            Self::WithSharepoint => "HR knowledge plus SharePoint documents",
            Self::WithWeb => "HR knowledge plus web search",
            Self::WithWebAndSharepoint => "HR knowledge plus web search and SharePoint",
        }
    }

    /// Names accepted by [`VariantTable::resolve_variant`]
    pub fn known_names() -> Vec<String> {
        Self::ALL.iter().map(|v| v.name().to_string()).collect()
    }
}

impl std::fmt::Display for KnowledgeBaseVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Concrete retrieval backend instance plus the sources it may use
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSourceSet {
    pub variant: KnowledgeBaseVariant,
    /// Knowledge base name on the retrieval service
    pub knowledge_base: String,
    pub index_name: String,
    pub description: String,
    /// Always contains [`DataSource::BaseDocuments`]
    pub sources: Vec<DataSource>,
}

impl DataSourceSet {
    pub fn includes(&self, source: DataSource) -> bool {
        self.sources.contains(&source)
    }
}

/// Static variant table. Instance names can be overridden per variant but the
/// set of variant names never changes.
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    overrides: BTreeMap<KnowledgeBaseVariant, String>,
    index_name: Option<String>,
}

impl VariantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a variant at a differently named knowledge base
    pub fn with_knowledge_base(
        mut self,
        variant: KnowledgeBaseVariant,
        knowledge_base: impl Into<String>,
    ) -> Self {
        self.overrides.insert(variant, knowledge_base.into());
        self
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Resolve a variant name into its data-source set
    pub fn resolve_variant(&self, name: &str) -> Result<DataSourceSet, ConfigurationError> {
        let variant = KnowledgeBaseVariant::from_name(name).ok_or_else(|| {
            ConfigurationError::UnknownVariant {
                name: name.to_string(),
                known: KnowledgeBaseVariant::known_names(),
            }
        })?;

        let knowledge_base = self
            .overrides
            .get(&variant)
            .cloned()
            .unwrap_or_else(|| variant.default_knowledge_base().to_string());

        Ok(DataSourceSet {
            variant,
            knowledge_base,
            index_name: self
                .index_name
                .clone()
                .unwrap_or_else(|| "gptkbindex".to_string()),
            description: variant.description().to_string(),
            sources: variant.sources(),
        })
    }
}

/// Retrieval strategy used by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMode {
    /// Backend may plan several dependent sub-queries before answering
    MultiHopPlanning,
    /// One keyword + vector + rerank pass
    SinglePassHybrid,
}

impl RetrievalMode {
    /// Name the retrieval backend uses for this mode
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::MultiHopPlanning => "agentic",
            Self::SinglePassHybrid => "semantic",
        }
    }

    const NAMES: &'static [(&'static str, Self)] = &[
        ("agentic", Self::MultiHopPlanning),
        ("multi-hop", Self::MultiHopPlanning),
        ("multihop", Self::MultiHopPlanning),
        ("semantic", Self::SinglePassHybrid),
        ("hybrid", Self::SinglePassHybrid),
        ("single-pass", Self::SinglePassHybrid),
    ];

    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, mode)| *mode)
    }

    pub fn known_names() -> Vec<String> {
        Self::NAMES.iter().map(|(n, _)| n.to_string()).collect()
    }
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Planning intensity for multi-hop retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const DEFAULT_TOP_K: usize = 5;

/// Resolved retrieval settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetrievalParameters {
    pub mode: RetrievalMode,
    /// `Some` only for [`RetrievalMode::MultiHopPlanning`]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Maximum passages handed to an agent
    pub top_k: usize,
}

/// Resolve a mode name and optional effort level.
///
/// Multi-hop without an explicit effort gets [`ReasoningEffort::Medium`].
/// Supplying an effort for single-pass mode is an error rather than being
/// silently ignored.
pub fn resolve_mode(
    name: &str,
    effort: Option<&str>,
) -> Result<RetrievalParameters, ConfigurationError> {
    let mode = RetrievalMode::from_name(name).ok_or_else(|| ConfigurationError::UnknownMode {
        name: name.to_string(),
        known: RetrievalMode::known_names(),
    })?;

    let effort = match effort {
        Some(e) => Some(
            ReasoningEffort::from_name(e)
                .ok_or_else(|| ConfigurationError::UnknownEffort { name: e.to_string() })?,
        ),
        None => None,
    };

    let reasoning_effort = match (mode, effort) {
        (RetrievalMode::MultiHopPlanning, e) => Some(e.unwrap_or_default()),
        (RetrievalMode::SinglePassHybrid, None) => None,
        (RetrievalMode::SinglePassHybrid, Some(e)) => {
            return Err(ConfigurationError::EffortNotApplicable {
                mode: mode.wire_name().to_string(),
                effort: e.as_str().to_string(),
            });
        }
    };

    Ok(RetrievalParameters {
        mode,
        reasoning_effort,
        top_k: DEFAULT_TOP_K,
    })
}

/// Names requested by the caller (config file, env, flags)
#[derive(Debug, Clone)]
pub struct SettingsRequest {
    pub variant: String,
    pub mode: String,
    pub reasoning_effort: Option<String>,
    pub top_k: usize,
    pub variants: VariantTable,
}

impl Default for SettingsRequest {
    fn default() -> Self {
        Self {
            variant: KnowledgeBaseVariant::Base.name().to_string(),
            mode: RetrievalMode::MultiHopPlanning.wire_name().to_string(),
            reasoning_effort: None,
            top_k: DEFAULT_TOP_K,
            variants: VariantTable::default(),
        }
    }
}

/// Immutable settings shared by every agent for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub sources: DataSourceSet,
    pub retrieval: RetrievalParameters,
}

impl Settings {
    /// Resolve and validate everything up front
    pub fn resolve(request: &SettingsRequest) -> Result<Self, ConfigurationError> {
        let sources = request.variants.resolve_variant(&request.variant)?;
        let mut retrieval = resolve_mode(&request.mode, request.reasoning_effort.as_deref())?;
        if request.top_k == 0 {
            return Err(ConfigurationError::InvalidTopK);
        }
        retrieval.top_k = request.top_k;

        debug!(
            "Resolved settings: variant={}, kb={}, sources={:?}, mode={}, effort={:?}, top_k={}",
            sources.variant,
            sources.knowledge_base,
            sources.sources,
            retrieval.mode,
            retrieval.reasoning_effort,
            retrieval.top_k
        );

        Ok(Self { sources, retrieval })
    }
}
