//! In-process fakes for the retrieval and LLM backends

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::config::DataSource;
use crate::providers::{ChatMessage, ChatResponse, ChatUsage, LlmProvider, StopReason};
use crate::retrieval::{ContextProvider, Passage, RetrievalError, RetrievalRequest, RetrievalResult};

pub fn passage(source_id: &str, content: &str) -> Passage {
    Passage {
        source_id: source_id.to_string(),
        content: content.to_string(),
        origin: DataSource::BaseDocuments,
        score: None,
    }
}

enum RetrieverBehavior {
    Fixed(Vec<Passage>),
    Fail(RetrievalError),
    Slow(Duration),
    /// One passage whose source id is derived from the query text
    Echo,
}

pub struct FakeRetriever {
    behavior: RetrieverBehavior,
    delay: Duration,
}

impl FakeRetriever {
    pub fn passages(passages: Vec<Passage>) -> Self {
        Self {
            behavior: RetrieverBehavior::Fixed(passages),
            delay: Duration::ZERO,
        }
    }

    pub fn empty() -> Self {
        Self::passages(Vec::new())
    }

    pub fn failing(err: RetrievalError) -> Self {
        Self {
            behavior: RetrieverBehavior::Fail(err),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            behavior: RetrieverBehavior::Slow(delay),
            delay: Duration::ZERO,
        }
    }

    pub fn echo() -> Self {
        Self {
            behavior: RetrieverBehavior::Echo,
            delay: Duration::ZERO,
        }
    }

    /// Sleep before answering, to force interleaving between concurrent queries
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ContextProvider for FakeRetriever {
    fn name(&self) -> &str {
        "fake"
    }

    async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<RetrievalResult, RetrievalError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            RetrieverBehavior::Fixed(p) => Ok(RetrievalResult::new(p.clone())),
            RetrieverBehavior::Fail(e) => Err(e.clone()),
            RetrieverBehavior::Slow(d) => {
                tokio::time::sleep(*d).await;
                Ok(RetrievalResult::default())
            }
            RetrieverBehavior::Echo => Ok(RetrievalResult::new(vec![passage(
                &format!("doc-for:{}", request.query),
                request.query,
            )])),
        }
    }
}

enum LlmBehavior {
    Reply(String),
    Fail(String),
    /// Cite every `[Source: x]` header found in the system prompt
    CiteContext,
}

pub struct FakeLlm {
    behavior: LlmBehavior,
    delay: Option<Duration>,
    systems: Arc<Mutex<Vec<String>>>,
    messages: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl FakeLlm {
    fn with(behavior: LlmBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            systems: Arc::new(Mutex::new(Vec::new())),
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::with(LlmBehavior::Reply(text.to_string()))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with(LlmBehavior::Fail(reason.to_string()))
    }

    pub fn cite_context() -> Self {
        Self::with(LlmBehavior::CiteContext)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seen_systems(&self) -> Arc<Mutex<Vec<String>>> {
        self.systems.clone()
    }

    pub fn seen_messages(&self) -> Arc<Mutex<Vec<Vec<ChatMessage>>>> {
        self.messages.clone()
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }

    async fn chat(&self, messages: &[ChatMessage], system: &str) -> Result<ChatResponse> {
        self.systems
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(system.to_string());
        self.messages
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(messages.to_vec());

        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }

        let text = match &self.behavior {
            LlmBehavior::Reply(t) => t.clone(),
            LlmBehavior::Fail(reason) => return Err(anyhow!("{}", reason)),
            LlmBehavior::CiteContext => {
                let ids: Vec<&str> = system
                    .lines()
                    .filter_map(|l| l.strip_prefix("[Source: "))
                    .filter_map(|l| l.strip_suffix(']'))
                    .collect();
                format!("Grounded answer.\n\n[Sources: {}]", ids.join(", "))
            }
        };

        Ok(ChatResponse {
            text,
            stop_reason: StopReason::EndTurn,
            usage: ChatUsage::default(),
        })
    }
}
