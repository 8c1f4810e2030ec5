use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use provlane_api::{serve_until, ApiState, ServerConfig, SessionRegistry};
use provlane_flow::renderer::render_proof_of_work_file;
use provlane_flow::{FileArtifactWriter, GraphFormat, ProofOfWork};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Live provenance graphs and timelines for multi-agent task runs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live distribution server (default)
    Serve(ServeArgs),
    /// Replay a proof-of-work file and export its graph
    Export {
        /// Proof-of-work JSON or YAML file
        input: PathBuf,
        /// Output file; the format follows its extension (default GEXF)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Force a format: json, gexf or graphml
        #[arg(short, long)]
        format: Option<String>,
        /// Also write the timeline snapshot as JSON here
        #[arg(long)]
        timeline: Option<PathBuf>,
        /// Observation display cap in characters
        #[arg(long, default_value_t = provlane_types::constants::DEFAULT_OBSERVATION_DISPLAY_CAP)]
        observation_cap: usize,
    },
    /// Print a proof-of-work file as an ASCII tree
    Tree {
        input: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(long)]
    backlog_capacity: Option<usize>,
    #[arg(long)]
    client_queue_capacity: Option<usize>,
    #[arg(long, help = "Close live streams idle for this many seconds")]
    client_idle_timeout_secs: Option<u64>,
    #[arg(long, help = "Keep closed sessions for this many seconds")]
    session_retention_secs: Option<u64>,
    #[arg(long)]
    observation_cap: Option<usize>,
    #[arg(long, help = "Directory for proof-of-work artifacts")]
    proof_of_work_dir: Option<PathBuf>,
    #[arg(long, help = "Do not write proof-of-work artifacts")]
    no_artifacts: bool,
}

impl ServeArgs {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(capacity) = self.backlog_capacity {
            config = config.with_backlog_capacity(capacity);
        }
        if let Some(capacity) = self.client_queue_capacity {
            config = config.with_client_queue_capacity(capacity);
        }
        if let Some(secs) = self.client_idle_timeout_secs {
            config = config.with_client_idle_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.session_retention_secs {
            config = config.with_session_retention(Duration::from_secs(secs));
        }
        if let Some(cap) = self.observation_cap {
            config = config.with_observation_cap(cap);
        }
        if let Some(dir) = self.proof_of_work_dir {
            config = config.with_proof_of_work_dir(Some(dir));
        }
        if self.no_artifacts {
            config = config.with_proof_of_work_dir(None);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "provlane_api=debug,provlane_flow=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(args.apply(ServerConfig::from_env()?)).await,
        Command::Export {
            input,
            output,
            format,
            timeline,
            observation_cap,
        } => export(&input, output, format, timeline, observation_cap),
        Command::Tree { input } => {
            let cap = ServerConfig::from_env()?.observation_cap;
            println!("{}", render_proof_of_work_file(&input, cap)?);
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let mut registry = SessionRegistry::new(config.clone());
    if let Some(dir) = &config.proof_of_work_dir {
        info!("Writing proof-of-work artifacts to: {}", dir.display());
        registry = registry.with_artifact_writer(Arc::new(FileArtifactWriter::new(dir.clone())));
    }
    let registry = Arc::new(registry);

    // Retention sweep
    let gc_registry = registry.clone();
    let gc_config = config.clone();
    let gc_task = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(gc_config.gc_interval.max(Duration::from_millis(100)));
        loop {
            interval.tick().await;
            let removed = gc_registry.sweep_expired(gc_config.session_retention).await;
            if removed > 0 {
                info!(removed, "Swept expired sessions");
            }
        }
    });

    let addr = config.bind_address();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("API server listening on {}", addr);

    let result = serve_until(listener, ApiState::new(registry.clone()), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await;

    gc_task.abort();
    if let Err(e) = &result {
        let aborted = registry.abort_all(&format!("server failure: {e}")).await;
        if aborted > 0 {
            warn!(aborted, "Open sessions aborted on exit");
        }
    }

    result.context("API server failed")
}

fn export(
    input: &Path,
    output: Option<PathBuf>,
    format: Option<String>,
    timeline: Option<PathBuf>,
    observation_cap: usize,
) -> Result<()> {
    let artifact = ProofOfWork::load(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let trace = artifact.replay(observation_cap)?;

    let (format, output) = GraphFormat::resolve_target(input, output, format.as_deref())?;
    std::fs::write(&output, trace.graph().export_as(format)?)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "✅ Graph exported to {} ({} nodes, {} edges)",
        output.display(),
        trace.graph().node_count(),
        trace.graph().edge_count()
    );

    if let Some(path) = timeline {
        let snapshot = serde_json::to_string_pretty(&trace.timeline().snapshot())?;
        std::fs::write(&path, snapshot)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✅ Timeline exported to {}", path.display());
    }
    Ok(())
}
