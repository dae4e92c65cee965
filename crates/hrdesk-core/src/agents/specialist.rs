//! A specialist agent: fixed instructions over the shared retrieval and LLM backends

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::profile::AgentDescriptor;
use super::prompt::{build_system_prompt, extract_sources};
use super::{AnswerResult, Citation};
use crate::config::Settings;
use crate::error::{DeskError, Stage};
use crate::providers::{ChatMessage, LlmProvider};
use crate::retrieval::{ContextProvider, RetrievalError, RetrievalRequest, RetrievalResult};
use crate::types::{CallOptions, Query, Specialization};

/// One specialist. Immutable once built, so a single instance serves any
/// number of concurrent queries.
pub struct SpecialistAgent {
    descriptor: AgentDescriptor,
    settings: Arc<Settings>,
    retriever: Arc<dyn ContextProvider>,
    llm: Arc<dyn LlmProvider>,
}

impl std::fmt::Debug for SpecialistAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialistAgent")
            .field("name", &self.descriptor.name)
            .field("retriever", &self.retriever.name())
            .field("model", &self.llm.model())
            .finish()
    }
}

impl SpecialistAgent {
    pub fn new(
        descriptor: AgentDescriptor,
        settings: Arc<Settings>,
        retriever: Arc<dyn ContextProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            descriptor,
            settings,
            retriever,
            llm,
        }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn specialization(&self) -> Specialization {
        self.descriptor.specialization
    }

    /// Retrieve evidence, then ask the model. Retrieval always finishes before
    /// the completion request is made.
    pub async fn answer(&self, query: &Query, opts: &CallOptions) -> Result<AnswerResult, DeskError> {
        let mut evidence = self.retrieve(query, opts).await?;
        // Only passages shown to the model may be cited
        evidence.passages.truncate(self.settings.retrieval.top_k);
        debug!(
            "{} retrieved {} passages for {}",
            self.descriptor.name,
            evidence.len(),
            query.id()
        );

        let system = build_system_prompt(
            &self.descriptor.instructions,
            &evidence,
            self.settings.retrieval.top_k,
            &self.descriptor.no_evidence_notice,
        );
        let mut messages = ChatMessage::from_history(query.history());
        messages.push(ChatMessage::user(query.text()));

        let response = self.generate(query, &messages, &system, opts).await?;
        if response.stop_reason.is_truncated() {
            warn!(
                "{} completion for {} was truncated ({:?})",
                self.descriptor.name,
                query.id(),
                response.stop_reason
            );
        }

        let (body, listed) = extract_sources(&response.text);

        if evidence.is_empty() {
            info!("{} found no evidence for {}", self.descriptor.name, query.id());
            return Ok(AnswerResult {
                text: self.with_notice(body),
                citations: Vec::new(),
                specialization: self.specialization(),
                evidence_found: false,
                usage: response.usage,
            });
        }

        let citations = select_citations(&evidence, listed.as_deref());
        Ok(AnswerResult {
            text: body,
            citations,
            specialization: self.specialization(),
            evidence_found: true,
            usage: response.usage,
        })
    }

    async fn retrieve(&self, query: &Query, opts: &CallOptions) -> Result<RetrievalResult, DeskError> {
        let request = RetrievalRequest {
            query: query.text(),
            sources: &self.settings.sources,
            params: &self.settings.retrieval,
            timeout: opts.timeout,
        };

        let outcome = tokio::select! {
            biased;
            _ = opts.cancel.cancelled() => {
                return Err(DeskError::Cancelled {
                    request_id: query.id(),
                    stage: Stage::Retrieval,
                });
            }
            r = tokio::time::timeout(opts.timeout, self.retriever.retrieve(&request)) => r,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(RetrievalError::Timeout(after))) => Err(self.retrieval_timeout(query, after)),
            Err(_elapsed) => Err(self.retrieval_timeout(query, opts.timeout)),
            Ok(Err(RetrievalError::Unavailable(reason))) => {
                warn!(
                    "{} retrieval unavailable for {}: {}",
                    self.descriptor.name,
                    query.id(),
                    reason
                );
                Err(DeskError::RetrievalUnavailable {
                    request_id: query.id(),
                    agent: self.specialization(),
                    reason,
                })
            }
        }
    }

    fn retrieval_timeout(&self, query: &Query, after: Duration) -> DeskError {
        warn!(
            "{} retrieval timed out for {} after {:?}",
            self.descriptor.name,
            query.id(),
            after
        );
        DeskError::RetrievalTimeout {
            request_id: query.id(),
            agent: self.specialization(),
            after,
        }
    }

    async fn generate(
        &self,
        query: &Query,
        messages: &[ChatMessage],
        system: &str,
        opts: &CallOptions,
    ) -> Result<crate::providers::ChatResponse, DeskError> {
        let outcome = tokio::select! {
            biased;
            _ = opts.cancel.cancelled() => {
                return Err(DeskError::Cancelled {
                    request_id: query.id(),
                    stage: Stage::Generation,
                });
            }
            r = tokio::time::timeout(opts.timeout, self.llm.chat(messages, system)) => r,
        };

        let failure = |reason: String| {
            warn!(
                "{} generation failed for {}: {}",
                self.descriptor.name,
                query.id(),
                reason
            );
            DeskError::GenerationFailure {
                request_id: query.id(),
                stage: Stage::Generation,
                agent: Some(self.specialization()),
                reason,
            }
        };

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(failure(format!("{:#}", e))),
            Err(_elapsed) => Err(failure(format!("timed out after {:?}", opts.timeout))),
        }
    }

    /// Guarantee the no-evidence notice is present, whatever the model wrote
    fn with_notice(&self, body: String) -> String {
        let notice = &self.descriptor.no_evidence_notice;
        if body.contains(notice.as_str()) {
            body
        } else if body.trim().is_empty() {
            notice.clone()
        } else {
            format!("{}\n\n{}", notice, body)
        }
    }
}

/// Citations for sources that were both retrieved and listed by the model.
/// When the model listed nothing, every retrieved source is cited.
fn select_citations(evidence: &RetrievalResult, listed: Option<&[String]>) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();
    for p in &evidence.passages {
        if citations.iter().any(|c| c.source_id == p.source_id) {
            continue;
        }
        let used = match listed {
            None => true,
            Some(ids) => ids.iter().any(|id| id.eq_ignore_ascii_case(&p.source_id)),
        };
        if used {
            citations.push(Citation {
                source_id: p.source_id.clone(),
                origin: p.origin,
            });
        }
    }
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataSource, SettingsRequest};
    use crate::testing::{FakeLlm, FakeRetriever, passage};
    use tokio_util::sync::CancellationToken;

    fn settings() -> Arc<Settings> {
        Arc::new(Settings::resolve(&SettingsRequest::default()).unwrap())
    }

    fn agent(retriever: FakeRetriever, llm: FakeLlm) -> SpecialistAgent {
        SpecialistAgent::new(
            AgentDescriptor::builtin(Specialization::Benefits),
            settings(),
            Arc::new(retriever),
            Arc::new(llm),
        )
    }

    fn opts() -> CallOptions {
        CallOptions::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_answer_with_evidence_uses_listed_citations() {
        let retriever = FakeRetriever::passages(vec![
            passage("Benefit_Options.pdf", "Standard deductible is $2,000."),
            passage("Northwind_Standard.pdf", "Copays apply."),
        ]);
        let llm = FakeLlm::reply("The deductible is $2,000.\n\n[Sources: Benefit_Options.pdf]");
        let a = agent(retriever, llm);

        let q = Query::new("What's the deductible for the health plan?").unwrap();
        let answer = a.answer(&q, &opts()).await.unwrap();
        assert_eq!(answer.text, "The deductible is $2,000.");
        assert!(answer.evidence_found);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source_id, "Benefit_Options.pdf");
        assert_eq!(answer.specialization, Specialization::Benefits);
    }

    #[tokio::test]
    async fn test_answer_without_listed_sources_cites_all_retrieved() {
        let retriever = FakeRetriever::passages(vec![
            passage("a.pdf", "x"),
            passage("b.pdf", "y"),
            passage("a.pdf", "z"),
        ]);
        let a = agent(retriever, FakeLlm::reply("Answer without a sources line."));
        let answer = a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap();
        let ids: Vec<_> = answer.citations.iter().map(|c| c.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_hallucinated_sources_are_dropped() {
        let retriever = FakeRetriever::passages(vec![passage("a.pdf", "x")]);
        let a = agent(retriever, FakeLlm::reply("Text.\n[Sources: a.pdf, made_up.pdf]"));
        let answer = a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap();
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].source_id, "a.pdf");
    }

    #[tokio::test]
    async fn test_empty_evidence_states_gap() {
        let llm = FakeLlm::reply("Please contact HR for details.\n[Sources: invented.pdf]");
        let a = agent(FakeRetriever::empty(), llm);
        let answer = a
            .answer(&Query::new("Is there a pet insurance plan?").unwrap(), &opts())
            .await
            .unwrap();
        let notice = &AgentDescriptor::builtin(Specialization::Benefits).no_evidence_notice;
        assert!(answer.text.starts_with(notice.as_str()));
        assert!(answer.text.contains("contact HR"));
        assert!(answer.citations.is_empty());
        assert!(!answer.evidence_found);
    }

    #[tokio::test]
    async fn test_empty_evidence_notice_not_duplicated() {
        let notice = AgentDescriptor::builtin(Specialization::Benefits).no_evidence_notice;
        let a = agent(FakeRetriever::empty(), FakeLlm::reply(&format!("{} Try HR.", notice)));
        let answer = a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap();
        assert_eq!(answer.text.matches(notice.as_str()).count(), 1);
    }

    #[tokio::test]
    async fn test_empty_evidence_prompt_says_so() {
        let llm = FakeLlm::reply("ok");
        let seen = llm.seen_systems();
        let a = agent(FakeRetriever::empty(), llm);
        a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap();
        let systems = seen.lock().unwrap();
        assert!(systems[0].contains("No documents in the knowledge base matched"));
    }

    #[tokio::test]
    async fn test_retrieval_timeout_propagates() {
        let a = agent(
            FakeRetriever::failing(RetrievalError::Timeout(Duration::from_secs(2))),
            FakeLlm::reply("should not be called"),
        );
        let q = Query::new("q").unwrap();
        match a.answer(&q, &opts()).await {
            Err(DeskError::RetrievalTimeout {
                request_id,
                agent,
                after,
            }) => {
                assert_eq!(request_id, q.id());
                assert_eq!(agent, Specialization::Benefits);
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected RetrievalTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_retrieval_hits_caller_deadline() {
        let a = agent(
            FakeRetriever::slow(Duration::from_secs(10)),
            FakeLlm::reply("unused"),
        );
        let opts = CallOptions::new(Duration::from_millis(20));
        let err = a.answer(&Query::new("q").unwrap(), &opts).await.unwrap_err();
        assert!(matches!(err, DeskError::RetrievalTimeout { after, .. } if after == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_retrieval_unavailable_propagates() {
        let a = agent(
            FakeRetriever::failing(RetrievalError::Unavailable("connection refused".to_string())),
            FakeLlm::reply("unused"),
        );
        let err = a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap_err();
        assert!(matches!(err, DeskError::RetrievalUnavailable { ref reason, .. } if reason == "connection refused"));
        assert_eq!(err.stage(), Stage::Retrieval);
    }

    #[tokio::test]
    async fn test_generation_failure_is_not_masked() {
        let a = agent(
            FakeRetriever::passages(vec![passage("a.pdf", "x")]),
            FakeLlm::failing("503 Service Unavailable"),
        );
        let err = a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap_err();
        match err {
            DeskError::GenerationFailure {
                stage, agent, reason, ..
            } => {
                assert_eq!(stage, Stage::Generation);
                assert_eq!(agent, Some(Specialization::Benefits));
                assert!(reason.contains("503"));
            }
            other => panic!("expected GenerationFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_history_is_threaded_into_messages() {
        let llm = FakeLlm::reply("ok");
        let seen = llm.seen_messages();
        let a = agent(FakeRetriever::passages(vec![passage("a.pdf", "x")]), llm);
        let q = Query::new("and dental?").unwrap().with_history(vec![crate::types::Turn {
            query: "Does the plan cover vision?".to_string(),
            response: "Yes.".to_string(),
        }]);
        a.answer(&q, &opts()).await.unwrap();
        let messages = seen.lock().unwrap();
        assert_eq!(messages[0].len(), 3);
        assert_eq!(messages[0][0], ChatMessage::user("Does the plan cover vision?"));
        assert_eq!(messages[0][2], ChatMessage::user("and dental?"));
    }

    #[tokio::test]
    async fn test_cancelled_before_retrieval() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let a = agent(FakeRetriever::slow(Duration::from_secs(10)), FakeLlm::reply("x"));
        let opts = opts().with_cancel(cancel);
        let err = a.answer(&Query::new("q").unwrap(), &opts).await.unwrap_err();
        assert!(matches!(err, DeskError::Cancelled { stage: Stage::Retrieval, .. }));
    }

    #[tokio::test]
    async fn test_citations_limited_to_passages_in_prompt() {
        let top_k = settings().retrieval.top_k;
        let passages = (0..top_k + 2)
            .map(|i| passage(&format!("doc{}.pdf", i), "text"))
            .collect();
        let llm = FakeLlm::reply("Answer without a sources line.");
        let seen = llm.seen_systems();
        let a = agent(FakeRetriever::passages(passages), llm);
        let answer = a.answer(&Query::new("q").unwrap(), &opts()).await.unwrap();

        assert_eq!(answer.citations.len(), top_k);
        let system = seen.lock().unwrap()[0].clone();
        for c in &answer.citations {
            assert!(system.contains(&c.source_id), "{} not in prompt", c.source_id);
        }
        assert!(!system.contains(&format!("doc{}.pdf", top_k)));
    }

    #[tokio::test]
    async fn test_cancelled_during_generation() {
        let cancel = CancellationToken::new();
        let a = agent(
            FakeRetriever::passages(vec![passage("a.pdf", "x")]),
            FakeLlm::reply("late").with_delay(Duration::from_secs(10)),
        );
        let opts = opts().with_cancel(cancel.clone());
        let q = Query::new("q").unwrap();
        let (result, _) = tokio::join!(a.answer(&q, &opts), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        assert!(matches!(result, Err(DeskError::Cancelled { stage: Stage::Generation, .. })));
    }

    #[test]
    fn test_select_citations_case_insensitive() {
        let evidence = RetrievalResult::new(vec![passage("Handbook.PDF", "x")]);
        let listed = vec!["handbook.pdf".to_string()];
        let c = select_citations(&evidence, Some(&listed));
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].origin, DataSource::BaseDocuments);
    }
}
