//! The per-node event loop and its driver-facing handle
//!
//! One tokio task owns the `ProtocolEngine` exclusively. Wire frames and
//! driver commands are processed strictly one at a time; handlers never
//! suspend, and the only sleeps are waiting for the next event and the
//! quiescence interval inside crash handling. After every event the
//! engine's outbox is drained onto the transport and a fresh snapshot is
//! published for advisory reads.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use treelock_core::{mailbox_name, NodeId, Transport};
use treelock_protocol::{Message, NodeSnapshot, ProtocolEngine, ProtocolMetrics};

use crate::error::{NodeError, Result};

/// Commands injected by the local workload driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    Enter,
    Quit,
    Crash,
}

/// Per-node runtime settings.
#[derive(Debug, Clone)]
pub struct NodeRuntimeConfig {
    /// Quiescence interval slept between a crash and the RESTART broadcast.
    /// Must exceed the worst-case delivery delay of in-flight frames.
    pub quiescence: Duration,

    /// When set, the node schedules an exit this long after every
    /// critical-section entry. The pending exit is cancelled on crash.
    pub auto_quit: Option<Duration>,
}

impl Default for NodeRuntimeConfig {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_millis(200),
            auto_quit: None,
        }
    }
}

/// Handle used by drivers and tests to talk to a running node.
///
/// Snapshot reads are advisory: the node re-validates every command inside
/// its event loop, so a stale read can at worst produce a rejected command.
#[derive(Clone)]
pub struct NodeHandle {
    number: NodeId,
    neighbors: Arc<Vec<NodeId>>,
    commands: mpsc::UnboundedSender<DriverCommand>,
    snapshots: watch::Receiver<NodeSnapshot>,
    metrics: Arc<ProtocolMetrics>,
}

impl NodeHandle {
    pub fn number(&self) -> NodeId {
        self.number
    }

    pub fn neighbors(&self) -> &[NodeId] {
        &self.neighbors
    }

    /// Protocol metrics of this node, for exposition by the embedder.
    pub fn metrics(&self) -> Arc<ProtocolMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Latest published state of the node.
    pub fn snapshot(&self) -> NodeSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch channel of published states, for awaiting a condition.
    pub fn watch(&self) -> watch::Receiver<NodeSnapshot> {
        self.snapshots.clone()
    }

    /// Ask for the critical section. Rejected while a previous local
    /// request is unresolved, the node is recovering, or it is already
    /// inside the critical section.
    pub fn enter_critical_section(&self) -> Result<()> {
        let snap = self.snapshot();
        if snap.iasked || snap.recovering || snap.using {
            return Err(NodeError::EnterRejected {
                node: self.number,
                iasked: snap.iasked,
                recovering: snap.recovering,
                using: snap.using,
            });
        }
        self.commands
            .send(DriverCommand::Enter)
            .map_err(|_| NodeError::Stopped(self.number))
    }

    /// Leave the critical section.
    pub fn quit_critical_section(&self) -> Result<()> {
        if !self.snapshot().using {
            return Err(NodeError::QuitRejected { node: self.number });
        }
        self.commands
            .send(DriverCommand::Quit)
            .map_err(|_| NodeError::Stopped(self.number))
    }

    /// Trigger the crash/recovery sequence.
    pub fn restart(&self) -> Result<()> {
        self.commands
            .send(DriverCommand::Crash)
            .map_err(|_| NodeError::Stopped(self.number))
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

/// The node task owning the protocol engine.
pub struct MutexNode {
    engine: ProtocolEngine,
    config: NodeRuntimeConfig,
    transport: Arc<dyn Transport>,
    wire_rx: mpsc::UnboundedReceiver<String>,
    command_rx: mpsc::UnboundedReceiver<DriverCommand>,
    command_tx: mpsc::UnboundedSender<DriverCommand>,
    snapshot_tx: watch::Sender<NodeSnapshot>,
    auto_quit_task: Option<JoinHandle<()>>,
    was_using: bool,
}

impl MutexNode {
    /// Spawn the event loop for one node.
    ///
    /// The caller registers `mailbox_name(number)` on the transport and
    /// hands over the receiving end. Every mailbox of the cluster must be
    /// registered before the first node is spawned, or the INITIALIZE
    /// flood from node 0 can race an unregistered neighbour.
    pub fn spawn(
        number: NodeId,
        neighbors: Vec<NodeId>,
        transport: Arc<dyn Transport>,
        wire_rx: mpsc::UnboundedReceiver<String>,
        config: NodeRuntimeConfig,
    ) -> (NodeHandle, JoinHandle<()>) {
        let metrics = Arc::new(ProtocolMetrics::new());
        let engine = ProtocolEngine::new(number, neighbors.clone(), Arc::clone(&metrics));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());

        let node = Self {
            engine,
            config,
            transport,
            wire_rx,
            command_rx,
            command_tx: command_tx.clone(),
            snapshot_tx,
            auto_quit_task: None,
            was_using: false,
        };
        let task = tokio::spawn(node.run());

        let handle = NodeHandle {
            number,
            neighbors: Arc::new(neighbors),
            commands: command_tx,
            snapshots: snapshot_rx,
            metrics,
        };
        (handle, task)
    }

    async fn run(mut self) {
        self.engine.bootstrap();
        self.after_event().await;

        loop {
            let outcome = tokio::select! {
                frame = self.wire_rx.recv() => match frame {
                    Some(line) => self.on_frame(line).await,
                    None => break,
                },
                command = self.command_rx.recv() => match command {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },
            };

            if let Err(e) = outcome {
                error!(
                    node = self.engine.number(),
                    error = %e,
                    "unrecoverable protocol violation; aborting node"
                );
                break;
            }
        }

        self.cancel_auto_quit();
        info!(node = self.engine.number(), "node task stopped");
    }

    async fn on_frame(&mut self, line: String) -> treelock_protocol::Result<()> {
        let msg = match Message::parse(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    node = self.engine.number(),
                    error = %e,
                    frame = %line,
                    "discarding malformed frame"
                );
                return Ok(());
            }
        };

        self.engine.handle_message(msg)?;
        self.after_event().await;
        Ok(())
    }

    async fn on_command(&mut self, cmd: DriverCommand) -> treelock_protocol::Result<()> {
        match cmd {
            DriverCommand::Enter => {
                self.engine.enter_cs();
            }
            DriverCommand::Quit => {
                self.engine.quit_cs();
            }
            DriverCommand::Crash => {
                self.crash().await?;
            }
        }
        self.after_event().await;
        Ok(())
    }

    /// The crash sequence: wipe state, wait out the quiescence interval,
    /// discard everything delivered in the meantime, then interrogate the
    /// neighbours.
    async fn crash(&mut self) -> treelock_protocol::Result<()> {
        if self.engine.snapshot().recovering {
            warn!(
                node = self.engine.number(),
                "restart ignored; recovery already in progress"
            );
            return Ok(());
        }

        self.cancel_auto_quit();
        self.was_using = false;
        self.engine.crash();
        // Make `recovering` visible to the driver for the whole sleep.
        self.publish();

        tokio::time::sleep(self.config.quiescence).await;

        let mut discarded = 0usize;
        while self.wire_rx.try_recv().is_ok() {
            discarded += 1;
        }
        debug!(
            node = self.engine.number(),
            discarded, "quiescence drain complete"
        );

        self.engine.broadcast_restart()
    }

    /// Drain the outbox onto the transport, manage the scheduled exit, and
    /// publish a fresh snapshot.
    async fn after_event(&mut self) {
        for env in self.engine.take_outbox() {
            let mailbox = mailbox_name(env.to);
            if let Err(e) = self.transport.send(&mailbox, env.message.encode()).await {
                error!(
                    node = self.engine.number(),
                    to = env.to,
                    error = %e,
                    "failed to deliver frame"
                );
            }
        }

        let using = self.engine.snapshot().using;
        if using && !self.was_using {
            self.schedule_auto_quit();
        } else if !using && self.was_using {
            self.cancel_auto_quit();
        }
        self.was_using = using;

        self.publish();
    }

    fn publish(&self) {
        // Failing means every handle is gone; the loop will wind down on
        // its own once the channels close.
        let _ = self.snapshot_tx.send(self.engine.snapshot());
    }

    fn schedule_auto_quit(&mut self) {
        let Some(hold) = self.config.auto_quit else {
            return;
        };
        self.cancel_auto_quit();

        let commands = self.command_tx.clone();
        let number = self.engine.number();
        self.auto_quit_task = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            debug!(node = number, "scheduled critical-section exit");
            let _ = commands.send(DriverCommand::Quit);
        }));
    }

    fn cancel_auto_quit(&mut self) {
        if let Some(task) = self.auto_quit_task.take() {
            task.abort();
        }
    }
}
