//! mg-replay: apply an AI response, or the local stub, to a stored session.
//!
//! Reads a session snapshot (JSON, or MessagePack for `.msgpack` files),
//! runs one exchange through the assistant and prints the exchange as JSON.
//! Set `RUST_LOG=debug` to trace every applied operation.

use chrono::Utc;
use clap::Parser;
use mg_core::id::{CanvasId, EdgeId, NodeId};
use mg_core::session::Session;
use mg_core::snapshot::{SessionSnapshot, SnapshotError};
use mg_editor::apply::OpApplier;
use mg_editor::assistant::{Assistant, Exchange};
use mg_editor::collab::{AiResponse, CollabError};
use mg_editor::config::EditorConfig;
use mg_editor::hit::Selection;
use mg_editor::stub::StubCollaborator;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::process;

/// Replay one AI exchange against a saved MindGraph session.
#[derive(Parser, Debug)]
#[command(name = "mg-replay", version, about, long_about = None)]
struct Cli {
    /// Session snapshot to load
    #[arg(short, long, env = "MG_SESSION")]
    session: PathBuf,

    /// AI response JSON (`{reply, ops}`) to apply
    #[arg(short, long, required_unless_present = "message")]
    response: Option<PathBuf>,

    /// User message. Without --response the local stub answers it.
    #[arg(short, long)]
    message: Option<String>,

    /// Selected node ids sent with the request
    #[arg(long = "select", value_name = "NODE")]
    selected_nodes: Vec<String>,

    /// Selected edge ids sent with the request
    #[arg(long = "select-edge", value_name = "EDGE")]
    selected_edges: Vec<String>,

    /// Switch to this canvas before the exchange
    #[arg(long)]
    canvas: Option<String>,

    /// Seed for random placement fallbacks
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Editor configuration JSON
    #[arg(short, long, env = "MG_CONFIG")]
    config: Option<PathBuf>,

    /// Write the updated session here
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Encode --out as MessagePack instead of JSON
    #[arg(long, requires = "out")]
    msgpack: bool,
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("config: {0}")]
    Config(serde_json::Error),
    #[error(transparent)]
    Collab(#[from] CollabError),
    #[error("unknown canvas `{0}`")]
    UnknownCanvas(String),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(exchange) => match serde_json::to_string_pretty(&exchange) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn read(path: &Path) -> Result<Vec<u8>, ReplayError> {
    std::fs::read(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn is_msgpack(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "msgpack" || ext == "mp")
}

fn load_session(path: &Path) -> Result<Session, ReplayError> {
    let bytes = read(path)?;
    let snapshot = if is_msgpack(path) {
        SessionSnapshot::from_msgpack(&bytes)?
    } else {
        SessionSnapshot::from_json(&String::from_utf8_lossy(&bytes))?
    };
    Ok(snapshot.restore()?)
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig, ReplayError> {
    let Some(path) = path else {
        return Ok(EditorConfig::default());
    };
    let bytes = read(path)?;
    let config = EditorConfig::from_json(&String::from_utf8_lossy(&bytes)).map_err(ReplayError::Config)?;
    Ok(config.sanitized())
}

fn selection(cli: &Cli) -> Selection {
    Selection {
        nodes: cli.selected_nodes.iter().map(|id| NodeId::intern(id)).collect(),
        edges: cli.selected_edges.iter().map(|id| EdgeId::intern(id)).collect(),
    }
}

fn run(cli: &Cli) -> Result<Exchange, ReplayError> {
    let config = load_config(cli.config.as_deref())?;
    let mut session = load_session(&cli.session)?;
    log::info!(
        "loaded session {} ({} canvases, active {})",
        session.id,
        session.store.len(),
        session.store.active_id()
    );

    if let Some(canvas) = &cli.canvas {
        session
            .store
            .switch_to(CanvasId::intern(canvas))
            .map_err(|_| ReplayError::UnknownCanvas(canvas.clone()))?;
    }

    let applier = OpApplier::new(StdRng::seed_from_u64(cli.seed), config.placement);
    let mut assistant = Assistant::new(applier);
    let selection = selection(cli);
    let now = Utc::now();

    let exchange = match &cli.response {
        Some(path) => {
            let response = AiResponse::from_json(&String::from_utf8_lossy(&read(path)?))?;
            let message = cli.message.as_deref().unwrap_or("(replayed response)");
            assistant.begin(&mut session, &selection, message, now)?;
            assistant.complete(&mut session, Ok(response), now)?
        }
        None => {
            let message = cli.message.as_deref().unwrap_or_default();
            assistant.send(&mut session, &selection, message, &mut StubCollaborator, now)?
        }
    };

    for skip in &exchange.report.skipped {
        log::warn!("op #{} ({}) skipped: {}", skip.index, skip.op, skip.error);
    }

    if let Some(out) = &cli.out {
        let snapshot = SessionSnapshot::capture(&session);
        let bytes = if cli.msgpack {
            snapshot.to_msgpack()?
        } else {
            snapshot.to_json()?.into_bytes()
        };
        std::fs::write(out, bytes).map_err(|source| ReplayError::Io {
            path: out.clone(),
            source,
        })?;
        log::info!("wrote {}", out.display());
    }
    Ok(exchange)
}
