//! OpenAI-compatible embedding client.
//!
//! Implements the `Embedder` trait from `sihah-core` against any
//! `/embeddings` endpoint. The model must be multilingual: Hebrew queries
//! are embedded as-is, without transliteration.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use secrecy::{ExposeSecret, SecretString};

use sihah_core::knowledge::embedder::Embedder;
use sihah_types::config::EmbeddingConfig;
use sihah_types::error::RetrievalError;

/// Maximum texts sent in one embeddings request.
const MAX_BATCH: usize = 64;

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
///
/// Does NOT derive Debug: the client holds the API key.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        dimension: usize,
        api_key: Option<SecretString>,
    ) -> Self {
        let mut config = OpenAIConfig::new().with_api_base(base_url);
        if let Some(key) = &api_key {
            config = config.with_api_key(key.expose_secret());
        }

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            dimension,
        }
    }

    /// Create from the `[embedding]` config section, resolving its key.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, RetrievalError> {
        let api_key = crate::llm::resolve_api_key(config.api_key_env.as_deref()).map_err(|_| {
            RetrievalError::Embedding(format!(
                "embedding key variable {:?} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(
            &config.base_url,
            &config.model,
            config.dimension,
            api_key,
        ))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        data.sort_by_key(|e| e.index);

        let vectors: Vec<Vec<f32>> = data.into_iter().map(|e| e.embedding).collect();
        check_dimensions(&vectors, self.dimension)?;
        Ok(vectors)
    }
}

/// Every vector must have the configured width.
fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<(), RetrievalError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(RetrievalError::DimensionMismatch {
            expected,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}

impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
