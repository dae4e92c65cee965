//! HTTP client for a hosted knowledge base `retrieve` endpoint

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::{ContextProvider, Passage, RetrievalError, RetrievalRequest, RetrievalResult};
use crate::config::{DataSource, RetrievalMode};

pub const DEFAULT_API_VERSION: &str = "2025-05-01-preview";

/// Knowledge base retrieval client. Cloning shares the connection pool.
#[derive(Clone)]
pub struct KnowledgeBaseClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    api_version: String,
}

impl std::fmt::Debug for KnowledgeBaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBaseClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl KnowledgeBaseClient {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .with_context(|| format!("Invalid knowledge base endpoint: {}", endpoint))?;
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn retrieve_url(&self, knowledge_base: &str) -> String {
        format!(
            "{}/knowledgebases/{}/retrieve?api-version={}",
            self.endpoint.as_str().trim_end_matches('/'),
            knowledge_base,
            self.api_version
        )
    }

    fn build_body(request: &RetrievalRequest<'_>) -> Value {
        let mut body = json!({
            "messages": [{ "role": "user", "content": request.query }],
            "retrievalMode": request.params.mode.wire_name(),
            "knowledgeSources": request
                .sources
                .sources
                .iter()
                .map(|s| s.wire_name())
                .collect::<Vec<_>>(),
            "topK": request.params.top_k,
        });

        if request.params.mode == RetrievalMode::MultiHopPlanning {
            if let Some(effort) = request.params.reasoning_effort {
                body["retrievalReasoningEffort"] = json!(effort.as_str());
            }
        }

        body
    }

    /// Turn wire references into passages, dropping ones without text and any
    /// that came from a source the active variant does not allow.
    fn parse_response(resp: RetrieveResponse, request: &RetrievalRequest<'_>) -> RetrievalResult {
        let passages = resp
            .references
            .into_iter()
            .filter_map(|r| r.into_passage())
            .filter(|p| request.sources.includes(p.origin))
            .take(request.params.top_k)
            .collect();
        RetrievalResult::new(passages)
    }
}

#[async_trait]
impl ContextProvider for KnowledgeBaseClient {
    fn name(&self) -> &str {
        "knowledge-base"
    }

    async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<RetrievalResult, RetrievalError> {
        let url = self.retrieve_url(&request.sources.knowledge_base);
        let body = Self::build_body(request);

        debug!(
            "Knowledge base request: kb={}, mode={}, sources={:?}",
            request.sources.knowledge_base, request.params.mode, request.sources.sources
        );

        let mut http = self.client.post(&url).timeout(request.timeout).json(&body);
        if let Some(key) = &self.api_key {
            http = http.header("api-key", key);
        }

        let response = http.send().await.map_err(|e| classify(e, request))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RetrievalError::Unavailable(format!(
                "retrieve failed with status {}: {}",
                status, error_text
            )));
        }

        let parsed: RetrieveResponse = response.json().await.map_err(|e| classify(e, request))?;
        let result = Self::parse_response(parsed, request);
        debug!("Knowledge base returned {} passages", result.len());
        Ok(result)
    }
}

fn classify(e: reqwest::Error, request: &RetrievalRequest<'_>) -> RetrievalError {
    if e.is_timeout() {
        RetrievalError::Timeout(request.timeout)
    } else {
        RetrievalError::Unavailable(e.to_string())
    }
}

// ── Wire types ──

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    references: Vec<WireReference>,
}

#[derive(Debug, Deserialize)]
struct WireReference {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    sourcefile: Option<String>,
    #[serde(default, rename = "docKey")]
    doc_key: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "sourceData")]
    source_data: Option<Value>,
    #[serde(default, rename = "rerankerScore")]
    score: Option<f32>,
}

impl WireReference {
    fn into_passage(self) -> Option<Passage> {
        let data_str = |key: &str| {
            self.source_data
                .as_ref()
                .and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let content = self
            .content
            .clone()
            .or_else(|| data_str("content"))
            .or_else(|| data_str("snippet"))
            .filter(|c| !c.trim().is_empty())?;

        let source_id = self
            .sourcefile
            .clone()
            .or_else(|| self.doc_key.clone())
            .or_else(|| self.url.clone())
            .or_else(|| data_str("sourcefile"))
            .or_else(|| data_str("url"))
            .or_else(|| data_str("title"))
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "unknown".to_string());

        Some(Passage {
            source_id,
            content,
            origin: self
                .kind
                .as_deref()
                .map(DataSource::from_wire)
                .unwrap_or(DataSource::BaseDocuments),
            score: self.score,
        })
    }
}
