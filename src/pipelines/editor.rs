//! Code edit: clarify the instruction, rewrite the selection, explain it.

use anyhow::Result;
use async_trait::async_trait;

use super::strip_code_fences;
use crate::context::AppContext;
use crate::llm::GenerationRequest;
use crate::models::{CodeEditRequest, CodeEditResponse};
use crate::patch::{replace_first, PatchError};
use crate::pipeline::{Pipeline, State, StateUpdate, Step};

pub const FULL_CODE: &str = "full_code";
pub const SELECTED_CODE: &str = "selected_code";
pub const INSTRUCTION: &str = "instruction";
pub const UPDATED_SELECTION: &str = "updated_selection";
pub const UPDATED_CODE: &str = "updated_code";
pub const EXPLANATION: &str = "explanation";

pub fn pipeline() -> Pipeline<AppContext> {
    Pipeline::new("code-edit")
        .then(ClarifyInstruction)
        .then(ApplyEdit)
        .then(ExplainChanges)
}

pub fn initial_state(req: &CodeEditRequest) -> State {
    State::new()
        .with_text(FULL_CODE, req.full_code.as_str())
        .with_text(SELECTED_CODE, req.selected_code.as_str())
        .with_text(INSTRUCTION, req.instruction.trim())
}

pub fn into_response(mut state: State) -> Result<CodeEditResponse> {
    Ok(CodeEditResponse {
        updated_code: state.take_text(UPDATED_SELECTION)?,
        full_updated_code: state.take_text(UPDATED_CODE)?,
        explanation: state.take_text(EXPLANATION)?,
    })
}

fn clarify_prompt(selected_code: &str, instruction: &str) -> String {
    format!(
        r#"You are an assistant that rewrites vague code-edit requests into precise instructions.

Selected code:
{selected_code}

Original instruction:
{instruction}

Rewrite the instruction so it says exactly what to change. Reply with the instruction only."#
    )
}

fn edit_prompt(full_code: &str, selected_code: &str, instruction: &str) -> String {
    format!(
        r#"You are a code editing assistant.

Full file, for context:
{full_code}

Selected code to modify:
{selected_code}

Instruction:
{instruction}

Return only the modified version of the selected code. Do not return the rest of the file
and do not add explanations or Markdown fences."#
    )
}

fn explain_prompt(full_code: &str, selected_code: &str, updated_selection: &str) -> String {
    format!(
        r#"Compare the original and the modified code and explain what changed and why.

Full code file:
{full_code}

Original:
{selected_code}

Modified:
{updated_selection}

Explanation:"#
    )
}

/// The line terminator `text` ends with, if any.
fn trailing_line_ending(text: &str) -> Option<&'static str> {
    if text.ends_with("\r\n") {
        Some("\r\n")
    } else if text.ends_with('\n') {
        Some("\n")
    } else {
        None
    }
}

struct ClarifyInstruction;

#[async_trait]
impl Step<AppContext> for ClarifyInstruction {
    fn name(&self) -> &'static str {
        "clarify_instruction"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let prompt = clarify_prompt(state.text(SELECTED_CODE)?, state.text(INSTRUCTION)?);
        let clarified = ctx.generator.generate(&GenerationRequest::new(prompt)).await?;
        let clarified = clarified.trim();
        if clarified.is_empty() {
            // Keep the caller's wording rather than an empty instruction.
            return Ok(StateUpdate::new());
        }
        Ok(StateUpdate::new().text(INSTRUCTION, clarified))
    }
}

struct ApplyEdit;

#[async_trait]
impl Step<AppContext> for ApplyEdit {
    fn name(&self) -> &'static str {
        "apply_edit"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let full_code = state.text(FULL_CODE)?;
        let selected_code = state.text(SELECTED_CODE)?;
        let prompt = edit_prompt(full_code, selected_code, state.text(INSTRUCTION)?);

        let raw = ctx.generator.generate(&GenerationRequest::new(prompt)).await?;
        let mut updated_selection = strip_code_fences(&raw);
        // Whole-line selections keep their terminator so the next line stays put.
        if let Some(ending) = trailing_line_ending(selected_code) {
            if !updated_selection.ends_with('\n') {
                updated_selection.push_str(ending);
            }
        }

        let patch = replace_first(full_code, selected_code, &updated_selection);
        if !patch.applied {
            if ctx.config.editor.strict_patch {
                return Err(PatchError::SelectionNotFound.into());
            }
            tracing::warn!("selected code not found in full code; returning it unchanged");
        }

        Ok(StateUpdate::new()
            .text(UPDATED_SELECTION, updated_selection)
            .text(UPDATED_CODE, patch.text))
    }
}

struct ExplainChanges;

#[async_trait]
impl Step<AppContext> for ExplainChanges {
    fn name(&self) -> &'static str {
        "explain_changes"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let prompt = explain_prompt(
            state.text(FULL_CODE)?,
            state.text(SELECTED_CODE)?,
            state.text(UPDATED_SELECTION)?,
        );
        let explanation = ctx.generator.generate(&GenerationRequest::new(prompt)).await?;
        Ok(StateUpdate::new().text(EXPLANATION, explanation.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_keeps_code_verbatim() {
        let req = CodeEditRequest {
            full_code: "  a = 1\n".into(),
            selected_code: "a = 1\n".into(),
            instruction: "  rename a  ".into(),
        };
        let state = initial_state(&req);
        assert_eq!(state.text(FULL_CODE).unwrap(), "  a = 1\n");
        assert_eq!(state.text(SELECTED_CODE).unwrap(), "a = 1\n");
        assert_eq!(state.text(INSTRUCTION).unwrap(), "rename a");
    }

    #[test]
    fn test_edit_prompt_contains_all_inputs() {
        let p = edit_prompt("FULL", "SEL", "INSTR");
        assert!(p.contains("FULL") && p.contains("SEL") && p.contains("INSTR"));
    }

    #[test]
    fn test_explain_prompt_includes_full_file() {
        let p = explain_prompt("def f():\n    return 1\n", "return 1", "return 2");
        assert!(p.contains("Full code file:\ndef f():"));
        assert!(p.contains("Original:\nreturn 1"));
        assert!(p.contains("Modified:\nreturn 2"));
    }

    #[test]
    fn test_trailing_line_ending() {
        assert_eq!(trailing_line_ending("x = 1\r\n"), Some("\r\n"));
        assert_eq!(trailing_line_ending("x = 1\n"), Some("\n"));
        assert_eq!(trailing_line_ending("x = 1"), None);
    }
}
