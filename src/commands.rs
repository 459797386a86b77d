//! CLI command implementations.
//!
//! Each `run_*` function backs one `codepilot` subcommand, invokes the same
//! [`Pipelines`] the HTTP server uses, and prints human-readable output.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::context::AppContext;
use crate::extract::ERROR_FILE;
use crate::files::{collect_files, write_files};
use crate::index::EmbeddingIndex;
use crate::models::{BoilerplateRequest, ChatRequest, CodeEditRequest, EmbedStoreRequest, ExplainRequest};
use crate::pipelines::Pipelines;

/// An inclusive, 1-based line range parsed from `A:B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

/// Parse `A:B` (or a single line `A`) into a [`LineRange`].
pub fn parse_line_range(s: &str) -> Result<LineRange, String> {
    let (start, end) = match s.split_once(':') {
        Some((a, b)) => (a.trim(), b.trim()),
        None => (s.trim(), s.trim()),
    };
    let start: usize = start
        .parse()
        .map_err(|_| format!("invalid line range '{}': expected A:B", s))?;
    let end: usize = end
        .parse()
        .map_err(|_| format!("invalid line range '{}': expected A:B", s))?;
    if start == 0 || end < start {
        return Err(format!("invalid line range '{}': lines are 1-based and A <= B", s));
    }
    Ok(LineRange { start, end })
}

/// Slice the selected lines out of `full`, verbatim, without the final
/// line terminator.
pub fn select_lines(full: &str, range: LineRange) -> Result<String> {
    let lines: Vec<&str> = full.split_inclusive('\n').collect();
    if range.end > lines.len() {
        bail!(
            "line range {}:{} is past the end of the file ({} lines)",
            range.start,
            range.end,
            lines.len()
        );
    }
    let joined: String = lines[range.start - 1..range.end].concat();
    let selected = joined
        .strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(&joined);
    Ok(selected.to_string())
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

pub async fn run_boilerplate(cfg: &Config, prompt: &str, out: &Path, dry_run: bool) -> Result<()> {
    let ctx = AppContext::from_config(cfg.clone())?;
    let req = BoilerplateRequest {
        prompt: prompt.to_string(),
    };
    let resp = Pipelines::new().generate_boilerplate(&ctx, &req).await?;

    if resp.files.contains_key(ERROR_FILE) && resp.files.len() == 1 {
        eprintln!("Warning: the model output could not be parsed; see {}", ERROR_FILE);
    }

    if dry_run {
        println!("Would write {} files:", resp.files.len());
        for (path, content) in &resp.files {
            println!("  {} ({} bytes)", path, content.len());
        }
        return Ok(());
    }

    let written = write_files(out, &resp.files)?;
    println!("Wrote {} files to {}:", written.len(), out.display());
    for path in &written {
        println!("  {}", path.display());
    }
    Ok(())
}

pub async fn run_edit(
    cfg: &Config,
    file: &Path,
    lines: LineRange,
    instruction: &str,
    write: bool,
) -> Result<()> {
    let ctx = AppContext::from_config(cfg.clone())?;
    let full_code = read_source(file)?;
    let req = CodeEditRequest {
        selected_code: select_lines(&full_code, lines)?,
        full_code,
        instruction: instruction.to_string(),
    };
    let resp = Pipelines::new().edit_code(&ctx, &req).await?;

    if write {
        std::fs::write(file, &resp.full_updated_code)
            .with_context(|| format!("Failed to write {}", file.display()))?;
        println!("Updated {}", file.display());
    } else {
        println!("{}", resp.updated_code);
    }
    println!();
    println!("{}", resp.explanation);
    Ok(())
}

pub async fn run_explain(cfg: &Config, file: &Path, lines: Option<LineRange>) -> Result<()> {
    let ctx = AppContext::from_config(cfg.clone())?;
    let full_code = read_source(file)?;
    let selected_code = match lines {
        Some(range) => select_lines(&full_code, range)?,
        None => full_code.clone(),
    };
    let req = ExplainRequest {
        selected_code,
        full_code,
    };
    let resp = Pipelines::new().explain_code(&ctx, &req).await?;
    println!("{}", resp.explanation);
    Ok(())
}

pub async fn run_index(cfg: &Config, root: &Path) -> Result<()> {
    let files = collect_files(root, &cfg.collect)?;
    if files.is_empty() {
        bail!("No source files found under {}", root.display());
    }
    let file_count = files.len();

    let ctx = AppContext::from_config(cfg.clone())?;
    let resp = Pipelines::new()
        .embed_and_store(&ctx, &EmbedStoreRequest { files })
        .await?;

    println!(
        "Indexed {} files into {} chunks at {} ({})",
        file_count,
        resp.chunks,
        cfg.index.path.display(),
        resp.status
    );
    Ok(())
}

pub async fn run_chat(cfg: &Config, query: &str) -> Result<()> {
    let ctx = AppContext::from_config(cfg.clone())?;
    let req = ChatRequest {
        query: query.to_string(),
    };
    let resp = Pipelines::new().chat(&ctx, &req).await?;
    println!("{}", resp.answer);
    Ok(())
}

pub async fn run_stats(cfg: &Config) -> Result<()> {
    let index = EmbeddingIndex::load(&cfg.index.path).await?;
    let stats = index.stats().await;
    index.close().await;
    let stats = stats?;

    println!("Index:    {}", cfg.index.path.display());
    println!("Chunks:   {}", stats.chunk_count);
    println!("Model:    {}", stats.model.as_deref().unwrap_or("-"));
    println!(
        "Dims:     {}",
        stats.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );
    println!("Built at: {}", stats.built_at.as_deref().unwrap_or("-"));
    Ok(())
}
