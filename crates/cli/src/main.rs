//! `kb-workflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    start the approval API server.
//! - `migrate`  apply the workflow schema to the configured database.
//! - `validate` check a flow registration payload without registering it.

mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};

use engine::{inspect_nodes, FlowNode, MemoryStore, Workflow, WorkflowStore};

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "kb-workflow",
    about = "Approval workflow engine for knowledge-base documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        /// Address to listen on; falls back to the configured bind address.
        #[arg(long, env = "WORKFLOW_BIND_ADDR")]
        bind: Option<String>,
    },
    /// Apply pending database migrations.
    Migrate,
    /// Validate a flow registration JSON file.
    Validate {
        /// Path to a `{code, name, description, nodes}` document.
        path: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct FlowFile {
    #[serde(default)]
    code: String,
    #[serde(default)]
    nodes: Vec<FlowNode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init(config.is_production());

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
            serve(&config, &bind).await?;
        }
        Command::Migrate => {
            let Some(url) = config.database_url.as_deref() else {
                bail!("WORKFLOW_DATABASE_URL must be set to run migrations");
            };
            let pool = db::create_pool(url, 2)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            info!("migrations applied");
        }
        Command::Validate { path } => return validate(&path),
    }
    Ok(ExitCode::SUCCESS)
}

async fn serve(config: &Config, bind: &str) -> anyhow::Result<()> {
    let store: Arc<dyn WorkflowStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url, config.db_max_connections)
                .await
                .context("failed to connect to database")?;
            db::run_migrations(&pool).await.context("migration failed")?;
            Arc::new(db::PgStore::new(pool))
        }
        None => {
            warn!("WORKFLOW_DATABASE_URL not set, state is kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    info!(env = %config.env, %bind, "starting workflow api");
    let workflow = Arc::new(Workflow::with_store(store));
    api::serve(bind, workflow, shutdown_signal())
        .await
        .with_context(|| format!("server on {bind} failed"))?;
    info!("server stopped");
    Ok(())
}

fn validate(path: &Path) -> anyhow::Result<ExitCode> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let flow: FlowFile = serde_json::from_str(&content).context("invalid JSON")?;

    let findings = registration_findings(&flow);
    if findings.is_empty() {
        println!("{}: ok ({} nodes)", path.display(), flow.nodes.len());
        return Ok(ExitCode::SUCCESS);
    }
    for finding in &findings {
        eprintln!("{}: {finding}", path.display());
    }
    Ok(ExitCode::FAILURE)
}

/// What registering `flow` would refuse or warn about.
///
/// Blank node ids get distinct placeholders first, since registration
/// assigns them fresh ids before inspecting the node list.
fn registration_findings(flow: &FlowFile) -> Vec<String> {
    let mut findings = Vec::new();
    if flow.code.trim().is_empty() {
        findings.push(engine::EngineError::CodeRequired.to_string());
    }
    if flow.nodes.is_empty() {
        findings.push(engine::EngineError::NodesRequired.to_string());
    }

    let nodes: Vec<FlowNode> = flow
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let mut node = node.clone();
            if node.id.trim().is_empty() {
                node.id = format!("<unnamed #{}>", i + 1);
            }
            node
        })
        .collect();
    findings.extend(inspect_nodes(&nodes).iter().map(ToString::to_string));
    findings
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
