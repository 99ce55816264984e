use anyhow::{Context, Result as AnyhowResult};
use canopy::actions::dispatcher::PanelRefresher;
use canopy::actions::registry::ContextType;
use canopy::config::Config;
use canopy::events::FocusEventGate;
use canopy::explorer::Explorer;
use canopy::host::{BufferInfo, RecordingHost};
use canopy::services::db::JsonDb;
use canopy::services::recency::JsonRecencyStore;
use canopy::sources::buffer::BufferSource;
use canopy::view::floating::{
    FloatingCreateOptions, FloatingOpenOptions, FloatingWindow, HostSurface,
};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ranked action menu for explorer panels
#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(about = "Contextual action menu for tree-structured explorer panels", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Path to the database holding the action history
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// JSON file with the buffer list the buffer source shows
    #[arg(long, value_name = "PATH")]
    buffers: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Print the JSON Schema of the configuration file and exit
    #[arg(long)]
    dump_schema: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the action menu of a source, most relevant entries first
    Menu {
        #[arg(long, default_value = "buffer")]
        source: String,
    },

    /// Run a menu entry against buffer numbers and print the host commands
    Run {
        /// Menu identifier, e.g. "open" or "open:split"
        identifier: String,

        /// Buffer numbers to run against, comma separated
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<u32>,

        #[arg(long, default_value = "buffer")]
        source: String,
    },
}

fn init_tracing(log_file: Option<&Path>) -> AnyhowResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> AnyhowResult<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load_or_default()),
    }
}

/// Buffers to show: from `--buffers`, or one placeholder per requested node
fn load_buffers(path: Option<&Path>, nodes: &[u32]) -> AnyhowResult<Vec<BufferInfo>> {
    if let Some(path) = path {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse buffer list {}", path.display()));
    }
    Ok(nodes
        .iter()
        .map(|bufnr| BufferInfo {
            bufnr: *bufnr,
            name: format!("buffer-{}", bufnr),
            hidden: false,
            windows: Vec::new(),
        })
        .collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    if args.dump_schema {
        println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;

    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    init_tracing(args.log_file.as_deref())?;

    let Some(command) = args.command else {
        anyhow::bail!("no command given, try 'canopy menu' or 'canopy --help'");
    };

    let nodes = match &command {
        Command::Run { nodes, .. } => nodes.clone(),
        Command::Menu { .. } => Vec::new(),
    };

    let db_path = args.db.clone().unwrap_or_else(|| config.db_path());
    tracing::info!("Using action history in {}", db_path.display());
    let db = Arc::new(JsonDb::new(db_path));
    let recency = Arc::new(JsonRecencyStore::new(
        db,
        config.recency_key(),
        config.recency.max_entries,
    ));

    let gate = Arc::new(FocusEventGate::new());
    let host = Arc::new(
        RecordingHost::with_gate(Arc::clone(&gate))
            .with_buffers(load_buffers(args.buffers.as_deref(), &nodes)?),
    );

    let buffer_source = Arc::new(BufferSource::new(host.clone(), config.buffer.clone())?);
    let mut explorer = Explorer::new(&config, recency, Arc::clone(&gate));
    explorer.add_source(buffer_source.clone());

    match command {
        Command::Menu { source } => {
            select_source(&mut explorer, &source)?;
            let window = FloatingWindow::create(
                HostSurface::new(host.clone(), "canopy-action-menu"),
                FloatingCreateOptions {
                    name: Some("action-menu".to_string()),
                },
            );
            let entries = explorer
                .show_action_menu(&window, FloatingOpenOptions::default())
                .await?;
            for entry in &entries {
                println!("{:>4}  {}", entry.score, entry.title);
            }
            window.close().await?;
            window.dispose();
        }
        Command::Run {
            identifier,
            nodes,
            source,
        } => {
            select_source(&mut explorer, &source)?;
            buffer_source
                .reload(&ContextType::from(source.as_str()))
                .await?;
            buffer_source.select(nodes);

            let window = FloatingWindow::create(
                HostSurface::new(host.clone(), "canopy-action-menu"),
                FloatingCreateOptions {
                    name: Some("action-menu".to_string()),
                },
            );
            let entry = explorer
                .show_action_menu(&window, FloatingOpenOptions::default())
                .await?
                .into_iter()
                .find(|entry| entry.identifier == identifier)
                .with_context(|| format!("'{}' is not in the action menu", identifier))?;

            tracing::info!("Executing {} via {}", entry.identifier, entry.command);
            explorer.run_menu_entry(&window, entry.request).await?;
            while window.has_pending_close() {
                tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
            }

            for cmd in host.commands() {
                println!("{}", cmd);
            }
        }
    }

    Ok(())
}

fn select_source(explorer: &mut Explorer, source: &str) -> AnyhowResult<()> {
    if !explorer.set_current(&ContextType::from(source)) {
        anyhow::bail!("unknown source '{}'", source);
    }
    Ok(())
}
