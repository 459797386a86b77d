//! Core data models used throughout CodePilot.
//!
//! These types represent the files, documents, chunks, and request/response
//! payloads that flow through the pipelines and the HTTP API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from relative file path to file content, ordered by path.
pub type FileMap = BTreeMap<String, String>;

/// A source file loaded into the embed-and-store pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Relative file path the content came from.
    pub source: String,
    pub content: String,
}

/// A chunk of a source document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by an index query, with its cosine similarity.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

// ============ HTTP payloads ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoilerplateRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoilerplateResponse {
    pub files: FileMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEditRequest {
    pub full_code: String,
    pub selected_code: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeEditResponse {
    /// The edited selection only.
    pub updated_code: String,
    /// The full file with the selection replaced.
    pub full_updated_code: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub selected_code: String,
    pub full_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedStoreRequest {
    pub files: FileMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedStoreResponse {
    pub status: String,
    /// Number of chunks written to the index.
    #[serde(default)]
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
}
