//! Shared test doubles for pipeline tests. No network, no clocks.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use sihah_types::agent::AgentConfig;
use sihah_types::chat::Metadata;
use sihah_types::error::RetrievalError;
use sihah_types::knowledge::KnowledgeDocument;
use sihah_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, Usage,
};
use uuid::Uuid;

use crate::knowledge::embedder::Embedder;
use crate::llm::provider::LlmProvider;

/// Deterministic bag-of-words embedder: each token is hashed into one of
/// `dimension` buckets, then the vector is L2-normalized.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut h = DefaultHasher::new();
            token.hash(&mut h);
            v[(h.finish() % self.dimension as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            v[0] = 1.0;
        } else {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder that always fails with a retryable error.
pub struct FailingEmbedder {
    pub dimension: usize,
}

impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Err(RetrievalError::Embedding("embedding service unavailable".into()))
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// One scripted provider outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(LlmError),
    /// Sleep before replying.
    Slow(Duration, String),
}

/// Chat provider that plays back a script, then repeats a fallback reply.
///
/// Every request it receives is recorded for assertions.
pub struct ScriptedLlm {
    caps: ProviderCapabilities,
    script: Mutex<VecDeque<Scripted>>,
    fallback_reply: String,
    pub calls: Arc<AtomicU32>,
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            caps: ProviderCapabilities {
                max_context_tokens: 128_000,
                max_output_tokens: 4_096,
            },
            script: Mutex::new(script.into()),
            fallback_reply: "בסדר".to_string(),
            calls: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn replying(reply: &str) -> Self {
        let mut llm = Self::new(Vec::new());
        llm.fallback_reply = reply.to_string();
        llm
    }
}

impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.caps
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let content = match next {
            Some(Scripted::Reply(text)) => text,
            Some(Scripted::Fail(e)) => return Err(e),
            Some(Scripted::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
            None => self.fallback_reply.clone(),
        };
        Ok(CompletionResponse {
            id: format!("resp-{}", self.calls.load(Ordering::SeqCst)),
            content,
            model: request.model.clone(),
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }
}

pub fn agent_config(agent_id: Uuid) -> AgentConfig {
    AgentConfig {
        agent_id,
        name: "נועה".to_string(),
        model: "test-model".to_string(),
        temperature: 0.3,
        max_output_tokens: 256,
        language_hint: Some("he".to_string()),
        system_prompt: "את {agent_name}, נציגת שירות. שפה: {language_hint}.".to_string(),
    }
}

pub fn document(agent_id: Uuid, document_id: &str, text: &str) -> KnowledgeDocument {
    KnowledgeDocument {
        agent_id,
        document_id: document_id.to_string(),
        text: text.to_string(),
        metadata: Metadata::new(),
        submitted_at: Utc::now(),
    }
}
