//! # codepilot CLI
//!
//! The `codepilot` binary runs the assistant pipelines from a terminal or
//! starts the HTTP API that editor extensions talk to.
//!
//! ## Usage
//!
//! ```bash
//! codepilot --config ./config/codepilot.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codepilot serve` | Start the HTTP API |
//! | `codepilot boilerplate "<prompt>"` | Generate project files |
//! | `codepilot edit <file> --lines A:B --instruction "..."` | Rewrite a selection |
//! | `codepilot explain <file> [--lines A:B]` | Explain a file or selection |
//! | `codepilot index [DIR]` | Embed a workspace into the index |
//! | `codepilot chat "<query>"` | Ask a question about the indexed code |
//! | `codepilot stats` | Show index metadata |
//!
//! Log verbosity is controlled by `RUST_LOG` (default `codepilot=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codepilot::commands::{self, parse_line_range, LineRange};
use codepilot::{config, server};

/// codepilot: LLM-backed code assistant pipelines.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/codepilot.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "codepilot",
    about = "LLM-backed code assistant: boilerplate, edits, explanations, and codebase chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/codepilot.toml`. Built-in defaults are used
    /// when the file does not exist.
    #[arg(long, global = true, default_value = "./config/codepilot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Generate project files from a short description.
    Boilerplate {
        /// What to build, e.g. "fastapi crud users".
        prompt: String,

        /// Directory to write the generated files into.
        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Print the generated file names without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rewrite a range of lines in a file according to an instruction.
    Edit {
        file: PathBuf,

        /// Inclusive, 1-based line range, e.g. `10:24`.
        #[arg(long, value_parser = parse_line_range)]
        lines: LineRange,

        #[arg(long)]
        instruction: String,

        /// Write the updated file back instead of printing the edited lines.
        #[arg(long)]
        write: bool,
    },

    /// Explain a file, or a range of lines within it.
    Explain {
        file: PathBuf,

        #[arg(long, value_parser = parse_line_range)]
        lines: Option<LineRange>,
    },

    /// Embed a workspace into the similarity index, replacing its contents.
    Index {
        /// Workspace root.
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Ask a question answered from the indexed workspace.
    Chat { query: String },

    /// Show what the similarity index currently holds.
    Stats,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "codepilot=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Boilerplate {
            prompt,
            out,
            dry_run,
        } => {
            commands::run_boilerplate(&cfg, &prompt, &out, dry_run).await?;
        }
        Commands::Edit {
            file,
            lines,
            instruction,
            write,
        } => {
            commands::run_edit(&cfg, &file, lines, &instruction, write).await?;
        }
        Commands::Explain { file, lines } => {
            commands::run_explain(&cfg, &file, lines).await?;
        }
        Commands::Index { dir } => {
            commands::run_index(&cfg, &dir).await?;
        }
        Commands::Chat { query } => {
            commands::run_chat(&cfg, &query).await?;
        }
        Commands::Stats => {
            commands::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
