//! Boilerplate generation: expand a short request, then generate files.

use anyhow::Result;
use async_trait::async_trait;

use crate::context::AppContext;
use crate::extract::extract_files;
use crate::llm::GenerationRequest;
use crate::models::{BoilerplateRequest, BoilerplateResponse};
use crate::pipeline::{Pipeline, State, StateUpdate, Step};

pub const USER_INPUT: &str = "user_input";
pub const ENHANCED_PROMPT: &str = "enhanced_prompt";
pub const RAW_OUTPUT: &str = "raw_output";
pub const FILES: &str = "files";

pub fn pipeline() -> Pipeline<AppContext> {
    Pipeline::new("boilerplate")
        .then(EnhancePrompt)
        .then(GenerateFiles)
}

pub fn initial_state(req: &BoilerplateRequest) -> State {
    State::new().with_text(USER_INPUT, req.prompt.trim())
}

pub fn into_response(mut state: State) -> Result<BoilerplateResponse> {
    Ok(BoilerplateResponse {
        files: state.take_files(FILES)?,
    })
}

fn enhance_prompt(user_input: &str) -> String {
    format!(
        r#"You turn terse developer requests into detailed instructions for generating a fresh project.

Rewrite the request below into a specific instruction that names every file, model,
route, component, and configuration a new project needs for the described functionality.

Examples:

Short: "fastapi crud users"
Enhanced: "Create a FastAPI project with CRUD endpoints for a User model. Include route
handlers, Pydantic schemas, SQLAlchemy models, and a SQLite database setup."

Short: "react login page"
Enhanced: "Generate a React login page component styled with Tailwind CSS, with controlled
email and password inputs, form validation, and a submit handler."

Short: "{user_input}"
Enhanced:"#
    )
}

fn generate_files(enhanced_prompt: &str) -> String {
    format!(
        r#"You are a code generation assistant.

Generate every code file required by the following instruction:

{enhanced_prompt}

Respond with a single JSON object mapping each file path to its full contents, for example:
{{
  "main.py": "<code>",
  "models.py": "<code>"
}}

Return raw JSON only: no Markdown, no code fences, no commentary."#
    )
}

struct EnhancePrompt;

#[async_trait]
impl Step<AppContext> for EnhancePrompt {
    fn name(&self) -> &'static str {
        "enhance_prompt"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let prompt = enhance_prompt(state.text(USER_INPUT)?);
        let enhanced = ctx.generator.generate(&GenerationRequest::new(prompt)).await?;
        Ok(StateUpdate::new().text(ENHANCED_PROMPT, enhanced.trim()))
    }
}

struct GenerateFiles;

#[async_trait]
impl Step<AppContext> for GenerateFiles {
    fn name(&self) -> &'static str {
        "generate_files"
    }

    async fn run(&self, state: &State, ctx: &AppContext) -> Result<StateUpdate> {
        let prompt = generate_files(state.text(ENHANCED_PROMPT)?);
        let raw = ctx.generator.generate(&GenerationRequest::new(prompt)).await?;
        let raw = raw.trim();
        let files = extract_files(raw);
        tracing::debug!(files = files.len(), "generated boilerplate files");
        Ok(StateUpdate::new()
            .text(RAW_OUTPUT, raw)
            .files(FILES, files))
    }
}
