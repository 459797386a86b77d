//! Chat over the indexed codebase.
//!
//! `retrieve_context` embeds the query, loads the persisted index and
//! keeps the `top_k` nearest chunks; `answer_question` asks the model to
//! answer from that context at temperature 0.

use anyhow::Result;
use async_trait::async_trait;

use crate::context::AppContext;
use crate::embedding::embed_query;
use crate::index::EmbeddingIndex;
use crate::llm::GenerationRequest;
use crate::models::{ChatRequest, ChatResponse, RetrievedChunk};
use crate::pipeline::{Pipeline, State, StateUpdate, Step, Value};

pub const QUERY: &str = "query";
pub const CONTEXT_CHUNKS: &str = "context_chunks";
pub const CONTEXT: &str = "context";
pub const ANSWER: &str = "answer";

/// Returned when the model produces an empty answer.
pub const FALLBACK_ANSWER: &str = "Sorry, couldn't generate a response.";

const ANSWER_TEMPERATURE: f32 = 0.0;

pub fn pipeline() -> Pipeline<AppContext> {
    Pipeline::new("chat")
        .then(RetrieveContext)
        .then(AnswerQuestion)
}

pub fn initial_state(req: &ChatRequest) -> State {
    State::new().with_text(QUERY, req.query.trim())
}

pub fn into_response(mut state: State) -> Result<ChatResponse> {
    Ok(ChatResponse {
        answer: state.take_text(ANSWER)?,
    })
}

/// Join retrieved chunk texts in rank order.
fn join_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_prompt(context: &str, query: &str) -> String {
    format!(
        r#"You are a helpful assistant that answers questions about a codebase.
Answer using only the context below. If the context does not contain the answer, say so.

Context:
{context}

Question:
{query}

Answer:"#
    )
}

struct RetrieveContext;

#[async_trait]
impl Step<AppContext> for RetrieveContext {
    fn name(&self) -> &'static str {
        "retrieve_context"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let query = state.text(QUERY)?;

        let query_vec = embed_query(ctx.embedder.as_ref(), query).await?;

        let index = EmbeddingIndex::load(&ctx.config.index.path).await?;
        let retrieved = async {
            index.ensure_model(ctx.embedder.model_name()).await?;
            index.query(&query_vec, ctx.config.retrieval.top_k).await
        }
        .await;
        index.close().await;
        let retrieved = retrieved?;

        tracing::debug!(hits = retrieved.len(), "retrieved context");
        let context = join_context(&retrieved);
        Ok(StateUpdate::new()
            .set(CONTEXT_CHUNKS, Value::Retrieved(retrieved))
            .text(CONTEXT, context))
    }
}

struct AnswerQuestion;

#[async_trait]
impl Step<AppContext> for AnswerQuestion {
    fn name(&self) -> &'static str {
        "answer_question"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let prompt = answer_prompt(state.text(CONTEXT)?, state.text(QUERY)?);
        let request = GenerationRequest::new(prompt).with_temperature(ANSWER_TEMPERATURE);
        let answer = ctx.generator.generate(&request).await?;
        let answer = answer.trim();
        let answer = if answer.is_empty() {
            FALLBACK_ANSWER
        } else {
            answer
        };
        Ok(StateUpdate::new().text(ANSWER, answer))
    }
}
