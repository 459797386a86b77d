//! # codepilot
//!
//! LLM-backed coding assistant pipelines served over HTTP and a CLI.
//!
//! Each user-facing capability is a fixed sequence of named steps over a
//! shared state map: generating project boilerplate from a short prompt,
//! editing or explaining a code selection, indexing a workspace into a
//! persisted similarity index, and chatting with that index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────────────┐
//! │   CLI    │──▶│ Pipelines  │──▶│ TextGenerator (LLM) │
//! │ codepilot│   │ Step → Step│   └─────────────────────┘
//! └──────────┘   │    → ...   │   ┌─────────────────────┐
//! ┌──────────┐   │            │──▶│ EmbeddingProvider   │
//! │   HTTP   │──▶│            │   └─────────────────────┘
//! │  (axum)  │   └─────┬──────┘   ┌─────────────────────┐
//! └──────────┘         └─────────▶│ SQLite vector index │
//!                                 └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! codepilot index ./my-project           # embed-and-store the workspace
//! codepilot chat "Where is auth handled?"
//! codepilot boilerplate "fastapi crud users" --out ./scaffold
//! codepilot serve                        # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Request/response and index types |
//! | [`pipeline`] | State map, `Step` trait, sequential runner |
//! | [`pipelines`] | The five concrete pipelines |
//! | [`llm`] | Text generation providers |
//! | [`embedding`] | Embedding providers |
//! | [`retry`] | Shared HTTP retry/backoff |
//! | [`chunk`] | Recursive character chunking |
//! | [`index`] | Persisted SQLite similarity index |
//! | [`extract`] | JSON extraction from free-form model output |
//! | [`patch`] | Literal selection replacement |
//! | [`files`] | Workspace collection and file writing |
//! | [`context`] | Shared collaborator handles |
//! | [`server`] | HTTP routes |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod context;
pub mod embedding;
pub mod extract;
pub mod files;
pub mod index;
pub mod llm;
pub mod models;
pub mod patch;
pub mod pipeline;
pub mod pipelines;
pub mod retry;
pub mod server;
