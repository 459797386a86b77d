//! Long-lived collaborator handles shared by every pipeline invocation.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::{self, TextGenerator};

/// Everything a pipeline step may call out to.
///
/// Built once at process start and borrowed by each invocation; no step
/// mutates it.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl AppContext {
    /// Wire explicit collaborators (used by tests and custom binaries).
    pub fn new(
        config: Config,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            generator,
            embedder,
        }
    }

    /// Build the providers named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let generator = llm::create_generator(&config.llm)?;
        let embedder = embedding::create_provider(&config.embedding)?;
        tracing::info!(
            llm_provider = %config.llm.provider,
            llm_model = generator.model_name(),
            embedding_provider = %config.embedding.provider,
            embedding_model = embedder.model_name(),
            "collaborators ready"
        );
        Ok(Self::new(config, generator, embedder))
    }
}
