//! Single-step explanation of a code selection.

use anyhow::Result;
use async_trait::async_trait;

use crate::context::AppContext;
use crate::llm::GenerationRequest;
use crate::models::{ExplainRequest, ExplainResponse};
use crate::pipeline::{Pipeline, State, StateUpdate, Step};

pub const SELECTED_CODE: &str = "selected_code";
pub const FULL_CODE: &str = "full_code";
pub const EXPLANATION: &str = "explanation";

const EXPLAIN_TEMPERATURE: f32 = 0.4;

pub fn pipeline() -> Pipeline<AppContext> {
    Pipeline::new("code-explain").then(ExplainCode)
}

pub fn initial_state(req: &ExplainRequest) -> State {
    State::new()
        .with_text(SELECTED_CODE, req.selected_code.as_str())
        .with_text(FULL_CODE, req.full_code.as_str())
}

pub fn into_response(mut state: State) -> Result<ExplainResponse> {
    Ok(ExplainResponse {
        explanation: state.take_text(EXPLANATION)?,
    })
}

fn explain_prompt(selected_code: &str, full_code: &str) -> String {
    format!(
        r#"You are a senior software engineer explaining code to a teammate.

Explain what the selected code does, how it works, and how it fits into the surrounding file.
Be clear and concise.

Selected code:
{selected_code}

Full file:
{full_code}"#
    )
}

struct ExplainCode;

#[async_trait]
impl Step<AppContext> for ExplainCode {
    fn name(&self) -> &'static str {
        "explain_code"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let prompt = explain_prompt(state.text(SELECTED_CODE)?, state.text(FULL_CODE)?);
        let request = GenerationRequest::new(prompt).with_temperature(EXPLAIN_TEMPERATURE);
        let explanation = ctx.generator.generate(&request).await?;
        Ok(StateUpdate::new().text(EXPLANATION, explanation.trim()))
    }
}
