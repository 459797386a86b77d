//! Embed-and-store: turn a file map into a persisted similarity index.
//!
//! The rebuild replaces the previous index in a single transaction, so a
//! failed run leaves the last good index in place.

use anyhow::Result;
use async_trait::async_trait;

use crate::chunk::chunk_document;
use crate::context::AppContext;
use crate::embedding::{embed_in_batches, EmbeddingsDisabled};
use crate::index::EmbeddingIndex;
use crate::models::{EmbedStoreRequest, EmbedStoreResponse, SourceDocument};
use crate::pipeline::{Pipeline, State, StateUpdate, Step, Value};

pub const FILES: &str = "files";
pub const DOCUMENTS: &str = "documents";
pub const CHUNKS: &str = "chunks";
pub const CHUNK_COUNT: &str = "chunk_count";
pub const STATUS: &str = "status";

pub const STATUS_SUCCESS: &str = "success";

pub fn pipeline() -> Pipeline<AppContext> {
    Pipeline::new("embed-and-store")
        .then(ReadDocuments)
        .then(SplitDocuments)
        .then(EmbedAndSave)
}

pub fn initial_state(req: &EmbedStoreRequest) -> State {
    State::new().with_files(FILES, req.files.clone())
}

pub fn into_response(mut state: State) -> Result<EmbedStoreResponse> {
    Ok(EmbedStoreResponse {
        chunks: state.count(CHUNK_COUNT)?,
        status: state.take_text(STATUS)?,
    })
}

struct ReadDocuments;

#[async_trait]
impl Step<AppContext> for ReadDocuments {
    fn name(&self) -> &'static str {
        "read_documents"
    }

    async fn run(&self, state: &State, _ctx: &AppContext) -> Result<StateUpdate> {
        let documents: Vec<SourceDocument> = state
            .files(FILES)?
            .iter()
            .map(|(path, content)| SourceDocument {
                source: path.clone(),
                content: content.clone(),
            })
            .collect();
        Ok(StateUpdate::new().set(DOCUMENTS, Value::Documents(documents)))
    }
}

struct SplitDocuments;

#[async_trait]
impl Step<AppContext> for SplitDocuments {
    fn name(&self) -> &'static str {
        "split_documents"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let chunking = &ctx.config.chunking;
        let chunks: Vec<_> = state
            .documents(DOCUMENTS)?
            .iter()
            .flat_map(|doc| chunk_document(doc, chunking.chunk_size, chunking.chunk_overlap))
            .collect();
        tracing::debug!(chunks = chunks.len(), "split documents");
        Ok(StateUpdate::new().set(CHUNKS, Value::Chunks(chunks)))
    }
}

struct EmbedAndSave;

#[async_trait]
impl Step<AppContext> for EmbedAndSave {
    fn name(&self) -> &'static str {
        "embed_and_save"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        // An empty chunk list would otherwise skip the embedder and wipe the index.
        if !ctx.embedder.is_enabled() {
            return Err(EmbeddingsDisabled.into());
        }
        let chunks = state.chunks(CHUNKS)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            embed_in_batches(ctx.embedder.as_ref(), &texts, ctx.config.embedding.batch_size).await?
        };
        let dims = vectors.first().map(Vec::len).unwrap_or(ctx.embedder.dims());

        let index = EmbeddingIndex::open(&ctx.config.index.path).await?;
        let built = index
            .build(chunks, &vectors, ctx.embedder.model_name(), dims)
            .await;
        index.close().await;
        built?;

        Ok(StateUpdate::new()
            .set(CHUNK_COUNT, Value::Count(chunks.len()))
            .text(STATUS, STATUS_SUCCESS))
    }
}
