//! Admin command line for the openings database.
//!
//! Every subcommand opens the configured database (running migrations),
//! performs one owner-scoped operation through the services and prints the
//! result as pretty JSON on stdout. Logs go to stderr, or to a daily rolling
//! file under `OPENINGS_LOG_DIR` when that is set.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use openings_server::persistence::Database;
use openings_server::practice::PracticeManager;
use openings_server::repertoires::RepertoireService;
use openings_server::ServerConfig;
use repertoire::{Color, NewOpening, RepertoireId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "openings-server", about = "Opening repertoire database tools")]
struct Cli {
    /// Database file; overrides OPENINGS_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database if needed and apply pending migrations.
    Migrate,
    /// List a user's repertoires.
    Repertoires {
        #[arg(long)]
        owner: UserId,
        /// Only repertoires played as this side.
        #[arg(long)]
        color: Option<Color>,
    },
    /// Create a repertoire from a JSON file: `{name, color, openings: [...]}`.
    Import {
        #[arg(long)]
        owner: UserId,
        #[arg(long)]
        file: PathBuf,
    },
    /// Recent practice sessions, newest first.
    History {
        #[arg(long)]
        owner: UserId,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// One practice session with its moves.
    Session {
        #[arg(long)]
        owner: UserId,
        #[arg(long)]
        id: SessionId,
    },
    /// Prepared moves from a position in one repertoire.
    Lookup {
        #[arg(long)]
        owner: UserId,
        #[arg(long)]
        repertoire: RepertoireId,
        #[arg(long)]
        fen: String,
    },
}

#[derive(Deserialize)]
struct ImportFile {
    name: String,
    color: Color,
    #[serde(default)]
    openings: Vec<NewOpening>,
}

#[derive(Serialize)]
struct MigrateReport {
    db_path: PathBuf,
    status: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = ServerConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let _guard = init_tracing(&config)?;

    tracing::debug!(db_path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path, config.max_connections)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;

    let result = run(cli.command, &config, &db).await;
    db.close().await;
    result
}

async fn run(command: Command, config: &ServerConfig, db: &Database) -> anyhow::Result<()> {
    let repertoires = Arc::new(db.repertoires());
    let service = RepertoireService::new(Arc::clone(&repertoires), config.op_timeout);

    match command {
        Command::Migrate => print_json(&MigrateReport {
            db_path: config.db_path.clone(),
            status: "migrated",
        }),
        Command::Repertoires { owner, color } => {
            let list = match color {
                Some(color) => service.list_by_color(owner, color).await?,
                None => service.list_by_owner(owner).await?,
            };
            print_json(&list)
        }
        Command::Import { owner, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let import: ImportFile = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let stored = service
                .import(owner, &import.name, import.color, import.openings)
                .await?;
            print_json(&stored)
        }
        Command::History { owner, limit } => {
            let manager = practice_manager(config, db, repertoires);
            print_json(&manager.history(owner, limit).await?)
        }
        Command::Session { owner, id } => {
            let manager = practice_manager(config, db, repertoires);
            print_json(&manager.get(id, owner).await?)
        }
        Command::Lookup {
            owner,
            repertoire,
            fen,
        } => {
            let index = service.position_index(owner, repertoire).await?;
            print_json(&index.expected_moves(fen.trim()))
        }
    }
}

fn practice_manager<R>(
    config: &ServerConfig,
    db: &Database,
    repertoires: Arc<R>,
) -> PracticeManager<openings_server::persistence::SqlitePracticeSessionRepository, R>
where
    R: openings_server::persistence::RepertoireRepository,
{
    PracticeManager::new(
        Arc::new(db.practice_sessions()),
        repertoires,
        config.op_timeout,
        config.history_limit,
    )
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Stderr by default; a daily rolling file when a log directory is configured.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(config: &ServerConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(log_dir) = &config.log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "openings-server");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .init();
    Ok(Some(guard))
}
