//! Query router
//!
//! Classifies each query, picks exactly one specialist and delegates to it.
//! The router holds no per-query state; it is shared behind an `Arc` and
//! every query runs independently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span, warn};

use crate::agents::{AgentDescriptor, AnswerResult, SpecialistAgent};
use crate::config::Settings;
use crate::error::{Candidate, ConfigurationError, DeskError, Stage};
use crate::intent::{Classification, ClassificationMethod, classify_keywords, classify_with_model};
use crate::providers::LlmProvider;
use crate::retrieval::ContextProvider;
use crate::types::{CallOptions, Query, Specialization};

/// Default minimum confidence for a classification to stand on its own
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// Which classifiers the router consults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierKind {
    /// Keyword scoring only; never calls the model to route
    #[default]
    Keyword,
    /// Keyword scoring, then the model when keywords fall below the threshold
    ModelAssisted,
}

/// What to do when no specialization clears the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityPolicy {
    /// Route to this specialist anyway
    Fallback(Specialization),
    /// Fail with `RoutingAmbiguous`
    Strict,
}

impl Default for AmbiguityPolicy {
    fn default() -> Self {
        Self::Fallback(Specialization::Benefits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterConfig {
    pub classifier: ClassifierKind,
    /// In (0, 1]
    pub threshold: f32,
    pub on_ambiguous: AmbiguityPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierKind::default(),
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            on_ambiguous: AmbiguityPolicy::default(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigurationError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

/// How the chosen specialist was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionMethod {
    Keyword,
    Model,
    /// Nothing cleared the threshold; the fallback specialist was used
    Fallback,
}

impl std::fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Model => write!(f, "model"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub specialization: Specialization,
    pub confidence: f32,
    pub method: DecisionMethod,
    pub rationale: String,
    /// Per-specialization confidence from the last classifier consulted
    pub candidates: Vec<Candidate>,
    pub decided_at: DateTime<Utc>,
}

impl RoutingDecision {
    fn from_classification(c: Classification) -> Self {
        let method = match c.method {
            ClassificationMethod::Keyword => DecisionMethod::Keyword,
            ClassificationMethod::Model => DecisionMethod::Model,
        };
        Self {
            specialization: c.best,
            confidence: c.confidence,
            method,
            rationale: c.rationale,
            candidates: c.candidates,
            decided_at: Utc::now(),
        }
    }
}

/// The decision together with the specialist's answer
#[derive(Debug, Clone)]
pub struct RoutedAnswer {
    pub decision: RoutingDecision,
    pub answer: AnswerResult,
}

pub struct Router {
    /// Indexed by `Specialization` declaration order
    agents: [SpecialistAgent; 3],
    llm: Arc<dyn LlmProvider>,
    config: RouterConfig,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("agents", &self.agents)
            .field("model", &self.llm.model())
            .field("config", &self.config)
            .finish()
    }
}

impl Router {
    /// Build the router and its three built-in specialists over shared backends
    pub fn new(
        settings: Arc<Settings>,
        retriever: Arc<dyn ContextProvider>,
        llm: Arc<dyn LlmProvider>,
        config: RouterConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let agents = Specialization::ALL.map(|s| {
            SpecialistAgent::new(
                AgentDescriptor::builtin(s),
                settings.clone(),
                retriever.clone(),
                llm.clone(),
            )
        });
        info!(
            "Router ready: kb={}, mode={}, classifier={:?}, threshold={:.2}",
            settings.sources.knowledge_base,
            settings.retrieval.mode,
            config.classifier,
            config.threshold
        );
        Ok(Self { agents, llm, config })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn agents(&self) -> &[SpecialistAgent] {
        &self.agents
    }

    pub fn agent(&self, specialization: Specialization) -> &SpecialistAgent {
        &self.agents[specialization as usize]
    }

    /// Decide which specialist takes the query, without answering it
    pub async fn classify(&self, query: &Query, opts: &CallOptions) -> Result<RoutingDecision, DeskError> {
        let keyword = classify_keywords(query.text());
        if keyword.confidence >= self.config.threshold {
            return Ok(RoutingDecision::from_classification(keyword));
        }

        let low = match self.config.classifier {
            ClassifierKind::Keyword => keyword,
            ClassifierKind::ModelAssisted => {
                let model = self.classify_with_model(query, opts).await?;
                if model.confidence >= self.config.threshold {
                    return Ok(RoutingDecision::from_classification(model));
                }
                model
            }
        };

        match self.config.on_ambiguous {
            AmbiguityPolicy::Strict => {
                warn!(
                    "No specialist cleared threshold {:.2} (best {} at {:.2})",
                    self.config.threshold, low.best, low.confidence
                );
                Err(DeskError::RoutingAmbiguous {
                    request_id: query.id(),
                    candidates: low.candidates,
                    threshold: self.config.threshold,
                })
            }
            AmbiguityPolicy::Fallback(fallback) => {
                let confidence = low
                    .candidates
                    .iter()
                    .find(|c| c.specialization == fallback)
                    .map(|c| c.confidence)
                    .unwrap_or(0.0);
                Ok(RoutingDecision {
                    specialization: fallback,
                    confidence,
                    method: DecisionMethod::Fallback,
                    rationale: format!("below threshold, using {} ({})", fallback, low.rationale),
                    candidates: low.candidates,
                    decided_at: Utc::now(),
                })
            }
        }
    }

    async fn classify_with_model(&self, query: &Query, opts: &CallOptions) -> Result<Classification, DeskError> {
        let outcome = tokio::select! {
            biased;
            _ = opts.cancel.cancelled() => {
                return Err(DeskError::Cancelled {
                    request_id: query.id(),
                    stage: Stage::Routing,
                });
            }
            r = tokio::time::timeout(opts.timeout, classify_with_model(self.llm.as_ref(), query.text())) => r,
        };

        let reason = match outcome {
            Ok(Ok(classification)) => return Ok(classification),
            Ok(Err(e)) => format!("{:#}", e),
            Err(_elapsed) => format!("timed out after {:?}", opts.timeout),
        };
        warn!("Model classification failed for {}: {}", query.id(), reason);
        Err(DeskError::GenerationFailure {
            request_id: query.id(),
            stage: Stage::Routing,
            agent: None,
            reason,
        })
    }

    /// Classify, delegate to one specialist, return its answer.
    ///
    /// A specialist failure is returned as-is; the query is never re-routed.
    pub async fn handle(&self, query: &Query, opts: &CallOptions) -> Result<RoutedAnswer, DeskError> {
        let span = info_span!("query", request_id = %query.id());
        async {
            let decision = self.classify(query, opts).await?;
            info!(
                agent = %decision.specialization,
                confidence = decision.confidence,
                method = %decision.method,
                "Routed: {}",
                decision.rationale
            );

            let answer = self.agent(decision.specialization).answer(query, opts).await?;
            info!(
                "Answered by {} with {} citations (evidence_found={})",
                answer.specialization,
                answer.citations.len(),
                answer.evidence_found
            );
            Ok::<_, DeskError>(RoutedAnswer { decision, answer })
        }
        .instrument(span)
        .await
    }
}
