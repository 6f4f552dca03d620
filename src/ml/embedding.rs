//! Embedding generation for ingest and semantic search
//!
//! The engine only depends on the [`Embedder`] trait: a deterministic
//! `text -> Vec<f32>` function with a fixed dimension per model. Two
//! adapters are provided:
//!
//! - [`OpenAiEmbedder`] calls any OpenAI-compatible `/v1/embeddings`
//!   endpoint (OpenAI itself, Ollama, llama.cpp server) over HTTP/JSON.
//! - [`CandleEmbedder`] runs a BERT-style sentence transformer in-process
//!   with Candle, downloading weights and tokenizer from the Hugging Face
//!   hub on first use.

use crate::config::Config;
use crate::error::{Result, WikiliteError};

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::api::tokio::Api;
use hf_hub::{Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Text embedding provider.
///
/// Implementations must return a non-empty vector of constant length for
/// a given model, deterministically per input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate the embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier persisted alongside the generated vectors.
    fn model_name(&self) -> &str;
}

/// Build the embedder selected by the configuration, or `None` when
/// embedding support is disabled (lexical-only operation).
pub async fn create_embedder(config: &Config) -> Result<Option<Arc<dyn Embedder>>> {
    if !config.ai {
        return Ok(None);
    }

    if config.model.is_empty() {
        return Err(WikiliteError::Config(
            "embedding model not configured".to_string(),
        ));
    }

    if config.ai_local {
        let embedder = CandleEmbedder::new(&config.model).await?;
        Ok(Some(Arc::new(embedder)))
    } else {
        let embedder = OpenAiEmbedder::new(&config.model, &config.ai_url, &config.ai_api_key);
        Ok(Some(Arc::new(embedder)))
    }
}

// ============ Remote provider ============

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// Create a client for `base_url` (e.g. `http://localhost:11434/v1`
    /// for Ollama). The API key may be empty for local servers.
    pub fn new(model: &str, base_url: &str, api_key: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| WikiliteError::Embedding("empty embedding response".to_string()))?;

        if embedding.is_empty() {
            return Err(WikiliteError::Embedding(
                "model returned a zero-length embedding".to_string(),
            ));
        }

        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Local provider ============

/// In-process sentence embedder: BERT forward pass, mean pooling over
/// token states, L2 normalization.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_name: String,
}

impl CandleEmbedder {
    /// Download (or reuse the cached) model files from the Hugging Face
    /// hub and load them onto the CPU device.
    pub async fn new(model_name: &str) -> Result<Self> {
        log::info!("Loading local embedding model: {}", model_name);

        let device = Device::Cpu;
        let api = Api::new().map_err(|e| WikiliteError::Embedding(e.to_string()))?;
        let repo = api.repo(Repo::new(model_name.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .await
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;
        let weights_path = repo
            .get("model.safetensors")
            .await
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;

        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(config_path)?)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams::default()))
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        log::info!("Local embedding model ready");

        Ok(Self {
            model,
            tokenizer,
            device,
            model_name: model_name.to_string(),
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| WikiliteError::Embedding(e.to_string()))?;

        let ids = encoding.get_ids().to_vec();
        if ids.is_empty() {
            return Err(WikiliteError::Embedding("empty tokenization".to_string()));
        }

        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids)?;

        // Mean pooling over the sequence dimension, then L2 normalization.
        let (_batch, seq_len, _hidden) = hidden.dims3()?;
        let pooled = (hidden.sum(1)? / (seq_len as f64))?;
        let norm = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        let normalized = pooled.broadcast_div(&norm)?;

        Ok(normalized.squeeze(0)?.to_vec1::<f32>()?)
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.encode(text)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
