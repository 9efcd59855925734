//! Treelock simulation binary
//!
//! Builds a tree of mutual-exclusion nodes over the in-process mailbox
//! transport and drives them with the synthetic workload until ctrl-c.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use treelock_core::{mailbox_name, Transport, TreeTopology};
use treelock_node::config::{SimConfig, TopologyShape};
use treelock_node::node::MutexNode;
use treelock_node::workload::{spawn_observer, WorkloadDriver};
use treelock_transport::MailboxRouter;

/// Treelock cluster simulator CLI
#[derive(Parser)]
#[command(name = "treelock-node")]
#[command(about = "Tree-structured distributed mutual exclusion with crash recovery")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "treelock.toml", env = "TREELOCK_CONFIG")]
    config: PathBuf,

    /// Number of nodes (overrides config)
    #[arg(long)]
    count: Option<usize>,

    /// Tree shape (overrides config)
    #[arg(long, value_enum)]
    shape: Option<TopologyShape>,

    /// Seed for topology and workload randomness (overrides config)
    #[arg(long, env = "TREELOCK_SEED")]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the generated tree as an edge list and exit
    Topology,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},treelock_node=debug", log_level).into()),
        )
        .with_target(true)
        .init();

    // Load configuration
    let mut config = if cli.config.exists() {
        let config = SimConfig::load(&cli.config)?;
        info!("Loaded configuration from {:?}", cli.config);
        config
    } else {
        info!("No config file at {:?}; using defaults", cli.config);
        SimConfig::default()
    };

    // Apply CLI overrides
    if let Some(count) = cli.count {
        config.topology.count = count;
    }
    if let Some(shape) = cli.shape {
        config.topology.shape = shape;
    }
    if let Some(seed) = cli.seed {
        config.topology.seed = Some(seed);
    }
    config.validate()?;

    let seed = config.topology.seed.unwrap_or_else(rand::random);
    let topology = build_topology(&config, seed)?;

    if let Some(Command::Topology) = cli.command {
        for (a, b) in topology.edges() {
            println!("{} - {}", a, b);
        }
        return Ok(());
    }

    info!(
        nodes = topology.node_count(),
        shape = ?config.topology.shape,
        seed,
        "starting cluster"
    );

    // Register every mailbox before spawning anything, so the INITIALIZE
    // flood from node 0 cannot race a missing neighbour.
    let router = Arc::new(MailboxRouter::new());
    let mut receivers = Vec::with_capacity(topology.node_count());
    for id in topology.node_ids() {
        receivers.push(router.register(&mailbox_name(id))?);
    }

    let runtime_config = config.node_runtime();
    let mut handles = Vec::with_capacity(topology.node_count());
    let mut tasks = Vec::with_capacity(topology.node_count());
    for (id, wire_rx) in topology.node_ids().zip(receivers) {
        let (handle, task) = MutexNode::spawn(
            id,
            topology.neighbors(id)?.to_vec(),
            Arc::clone(&router) as Arc<dyn Transport>,
            wire_rx,
            runtime_config.clone(),
        );
        handles.push(handle);
        tasks.push(task);
    }

    let shutdown = CancellationToken::new();
    let observer = spawn_observer(
        handles.clone(),
        Duration::from_millis(config.workload.observer_interval_ms),
        shutdown.clone(),
    );

    let driver_task = if config.workload.enabled {
        let driver = WorkloadDriver::new(handles.clone(), config.workload.clone(), seed);
        Some(tokio::spawn(driver.run(shutdown.clone())))
    } else {
        None
    };

    signal::ctrl_c().await?;
    info!("Received shutdown signal");

    shutdown.cancel();
    if let Some(task) = driver_task {
        let _ = task.await;
    }
    let _ = observer.await;

    for task in &tasks {
        task.abort();
    }
    futures::future::join_all(tasks).await;

    info!("Shutdown complete");
    Ok(())
}

fn build_topology(config: &SimConfig, seed: u64) -> Result<TreeTopology> {
    let topology = match config.topology.shape {
        TopologyShape::Line => TreeTopology::line(config.topology.count)?,
        TopologyShape::Star => TreeTopology::star(config.topology.count)?,
        TopologyShape::Random => {
            TreeTopology::random(config.topology.count, &mut StdRng::seed_from_u64(seed))?
        }
    };
    Ok(topology)
}
