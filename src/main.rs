//! # Subgenre Match CLI (`sgm`)
//!
//! ## Usage
//!
//! ```bash
//! sgm --config ./config/sgm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sgm init` | Create the SQLite database and `subgenres` table |
//! | `sgm import json <file>` | Import a `subgenres.json` array |
//! | `sgm import excel <file>` | Import subgenres from the master workbook |
//! | `sgm embed pending` | Embed missing or stale prototypes |
//! | `sgm embed rebuild` | Regenerate every embedding |
//! | `sgm export` | Dump the store as JSON Lines or a compact array |
//! | `sgm rank` | Top-20 subgenres for each input chunk |
//! | `sgm classify` | Per-document subgenre summary |
//! | `sgm serve` | Serve the store over HTTP |
//!
//! Results go to stdout; progress and logs go to stderr. A fatal error
//! prints `{"error": {"code": ..., "message": ...}}` on stderr and exits
//! with status 1.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use subgenre_match::classify::{self, RunOptions};
use subgenre_match::progress::ProgressMode;
use subgenre_match::{config, embed_cmd, export, import, migrate, server};
use subgenre_match_core::MatchError;

/// Subgenre Match — classify manuscript chunks into literary subgenres.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sgm.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sgm",
    about = "Subgenre Match — classify manuscript chunks into literary subgenres",
    version,
    long_about = "Subgenre Match ranks embedded manuscript chunks against a reference store of \
    subgenre prototypes by cosine similarity and aggregates the per-chunk votes into a \
    per-document summary."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sgm.toml")]
    config: PathBuf,

    /// Progress output on stderr: off, human, or json.
    /// Defaults to human when stderr is a terminal, otherwise off.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `subgenres` table.
    /// Running it again is safe.
    Init,

    /// Import subgenres into the reference store.
    Import {
        #[command(subcommand)]
        source: ImportSource,
    },

    /// Manage prototype embeddings.
    ///
    /// Requires an embedding provider (e.g. Ollama) to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Export the reference store.
    Export {
        /// Write one compact JSON array instead of JSON Lines.
        #[arg(long)]
        compact: bool,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rank each input chunk against the reference store.
    ///
    /// Reads query records (JSON Lines, a JSON array, or one object) and
    /// writes one ranking per chunk as JSON Lines.
    Rank {
        /// Input file; `-` or omitted reads stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write results to this file and print its path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Drop malformed records instead of failing the run.
        #[arg(long)]
        skip_malformed: bool,
    },

    /// Classify documents by aggregating chunk votes.
    ///
    /// Reads query records and writes one summary per document title as
    /// JSON Lines.
    Classify {
        /// Input file; `-` or omitted reads stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write results to this file and print its path.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Drop malformed records instead of failing the run.
        #[arg(long)]
        skip_malformed: bool,
    },

    /// Serve the reference store as JSON over HTTP.
    ///
    /// Binds to `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ImportSource {
    /// Import a `subgenres.json` array.
    Json {
        file: PathBuf,

        /// Delete every existing subgenre first.
        #[arg(long)]
        replace: bool,
    },
    /// Import one sheet of an Excel workbook.
    Excel {
        file: PathBuf,

        /// Sheet name; defaults to `[import].sheet`.
        #[arg(long)]
        sheet: Option<String>,

        /// Delete every existing subgenre first.
        #[arg(long)]
        replace: bool,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed prototypes that are missing, stale, or from another model.
    Pending {
        /// Maximum number of subgenres to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without embedding anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Clear and regenerate every embedding.
    Rebuild,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SGM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config(&cli.config)?;
    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let progress = mode.reporter();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { source } => match source {
            ImportSource::Json { file, replace } => {
                import::run_import_json(&cfg, &file, replace).await?;
            }
            ImportSource::Excel {
                file,
                sheet,
                replace,
            } => {
                import::run_import_excel(&cfg, &file, sheet.as_deref(), replace).await?;
            }
        },
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, dry_run } => {
                embed_cmd::run_embed_pending(&cfg, limit, dry_run, progress.as_ref()).await?;
            }
            EmbedAction::Rebuild => {
                embed_cmd::run_embed_rebuild(&cfg, progress.as_ref()).await?;
            }
        },
        Commands::Export { compact, output } => {
            export::run_export(&cfg, compact, output.as_deref()).await?;
        }
        Commands::Rank {
            input,
            output,
            skip_malformed,
        } => {
            let opts = RunOptions {
                input: input.as_deref(),
                output: output.as_deref(),
                skip_malformed,
            };
            classify::run_rank(&cfg, &opts, progress.as_ref()).await?;
        }
        Commands::Classify {
            input,
            output,
            skip_malformed,
        } => {
            let opts = RunOptions {
                input: input.as_deref(),
                output: output.as_deref(),
                skip_malformed,
            };
            classify::run_classify(&cfg, &opts, progress.as_ref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// Print a fatal error as one JSON object on stderr.
fn report_error(err: &anyhow::Error) {
    let code = err
        .chain()
        .find_map(|e| e.downcast_ref::<MatchError>())
        .map(MatchError::code)
        .unwrap_or("internal");
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": format!("{:#}", err),
        }
    });
    eprintln!("{}", body);
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("fatal: {:?}", err);
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}
