//! The five request-scoped pipelines.
//!
//! | Pipeline | Steps |
//! |----------|-------|
//! | [`boilerplate`] | `enhance_prompt` → `generate_files` |
//! | [`chat`] | `retrieve_context` → `answer_question` |
//! | [`editor`] | `clarify_instruction` → `apply_edit` → `explain_changes` |
//! | [`explainer`] | `explain_code` |
//! | [`embed_store`] | `read_documents` → `split_documents` → `embed_and_save` |
//!
//! [`Pipelines`] builds every sequence once; its methods take a typed
//! request, seed the initial [`State`](crate::pipeline::State), invoke the
//! sequence, and map the final state to a typed response.

pub mod boilerplate;
pub mod chat;
pub mod editor;
pub mod embed_store;
pub mod explainer;

use anyhow::Result;
use thiserror::Error;

use crate::context::AppContext;
use crate::models::{
    BoilerplateRequest, BoilerplateResponse, ChatRequest, ChatResponse, CodeEditRequest,
    CodeEditResponse, EmbedStoreRequest, EmbedStoreResponse, ExplainRequest, ExplainResponse,
};
use crate::patch::PatchError;
use crate::pipeline::Pipeline;

/// A request rejected before any step runs.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), RequestError> {
    if value.trim().is_empty() {
        return Err(RequestError::Empty(field));
    }
    Ok(())
}

/// Remove a surrounding Markdown code fence, if the whole text is fenced.
///
/// Leading blank lines and trailing whitespace are dropped; indentation of
/// the first code line is kept.
pub fn strip_code_fences(raw: &str) -> String {
    let body = trim_blank_edges(raw);
    if !body.trim_start().starts_with("```") {
        return body.to_string();
    }
    let mut lines: Vec<&str> = body.lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    trim_blank_edges(&lines.join("\n")).to_string()
}

fn trim_blank_edges(s: &str) -> &str {
    let s = s.trim_end();
    let mut start = 0;
    for line in s.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &s[start..]
}

/// Every pipeline, built once per process.
pub struct Pipelines {
    pub boilerplate: Pipeline<AppContext>,
    pub chat: Pipeline<AppContext>,
    pub editor: Pipeline<AppContext>,
    pub explainer: Pipeline<AppContext>,
    pub embed_store: Pipeline<AppContext>,
}

impl Default for Pipelines {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipelines {
    pub fn new() -> Self {
        Self {
            boilerplate: boilerplate::pipeline(),
            chat: chat::pipeline(),
            editor: editor::pipeline(),
            explainer: explainer::pipeline(),
            embed_store: embed_store::pipeline(),
        }
    }

    pub async fn generate_boilerplate(
        &self,
        ctx: &AppContext,
        req: &BoilerplateRequest,
    ) -> Result<BoilerplateResponse> {
        require_non_empty("prompt", &req.prompt)?;
        let state = self
            .boilerplate
            .invoke(boilerplate::initial_state(req), ctx)
            .await?;
        boilerplate::into_response(state)
    }

    pub async fn edit_code(&self, ctx: &AppContext, req: &CodeEditRequest) -> Result<CodeEditResponse> {
        require_non_empty("selected_code", &req.selected_code)?;
        require_non_empty("instruction", &req.instruction)?;
        if ctx.config.editor.strict_patch && !req.full_code.contains(req.selected_code.as_str()) {
            return Err(PatchError::SelectionNotFound.into());
        }
        let state = self.editor.invoke(editor::initial_state(req), ctx).await?;
        editor::into_response(state)
    }

    pub async fn explain_code(&self, ctx: &AppContext, req: &ExplainRequest) -> Result<ExplainResponse> {
        require_non_empty("selected_code", &req.selected_code)?;
        let state = self
            .explainer
            .invoke(explainer::initial_state(req), ctx)
            .await?;
        explainer::into_response(state)
    }

    pub async fn embed_and_store(
        &self,
        ctx: &AppContext,
        req: &EmbedStoreRequest,
    ) -> Result<EmbedStoreResponse> {
        if req.files.is_empty() {
            return Err(RequestError::Empty("files").into());
        }
        let state = self
            .embed_store
            .invoke(embed_store::initial_state(req), ctx)
            .await?;
        embed_store::into_response(state)
    }

    pub async fn chat(&self, ctx: &AppContext, req: &ChatRequest) -> Result<ChatResponse> {
        require_non_empty("query", &req.query)?;
        let state = self.chat.invoke(chat::initial_state(req), ctx).await?;
        chat::into_response(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```python\nx = 1\n```"), "x = 1");
        assert_eq!(strip_code_fences("\n  x = 1  \n"), "  x = 1");
        assert_eq!(
            strip_code_fences("```python\n    return a + b\n```"),
            "    return a + b"
        );
        assert_eq!(strip_code_fences("```\na\nb\n```\n"), "a\nb");
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("query", "  \n").is_err());
        assert!(require_non_empty("query", "why?").is_ok());
    }

    #[test]
    fn test_step_order() {
        let p = Pipelines::new();
        assert_eq!(p.boilerplate.step_names(), vec!["enhance_prompt", "generate_files"]);
        assert_eq!(p.chat.step_names(), vec!["retrieve_context", "answer_question"]);
        assert_eq!(
            p.editor.step_names(),
            vec!["clarify_instruction", "apply_edit", "explain_changes"]
        );
        assert_eq!(p.explainer.step_names(), vec!["explain_code"]);
        assert_eq!(
            p.embed_store.step_names(),
            vec!["read_documents", "split_documents", "embed_and_save"]
        );
    }
}
