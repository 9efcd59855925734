//! Simulation configuration loading and validation

use anyhow::{ensure, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::node::NodeRuntimeConfig;

/// Complete simulation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SimConfig {
    #[serde(default)]
    pub topology: TopologySection,

    #[serde(default)]
    pub protocol: ProtocolSection,

    #[serde(default)]
    pub workload: WorkloadSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologySection {
    /// Number of nodes in the tree.
    #[serde(default = "default_node_count")]
    pub count: usize,

    /// Tree shape.
    #[serde(default)]
    pub shape: TopologyShape,

    /// Seed for the random tree and the workload driver. A random seed is
    /// drawn (and logged) when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TopologyShape {
    #[default]
    Random,
    Line,
    Star,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolSection {
    /// Quiescence interval between a crash and the RESTART broadcast. Must
    /// exceed the worst-case delivery delay of in-flight frames.
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,

    /// How long a node stays inside the critical section before the
    /// scheduled exit fires.
    #[serde(default = "default_cs_hold_ms")]
    pub cs_hold_ms: u64,

    /// Schedule an automatic exit on every critical-section entry.
    #[serde(default = "default_true")]
    pub auto_quit: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkloadSection {
    /// Drive random enter/quit/crash actions.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bounds for the per-node countdown counters, in ticks.
    #[serde(default = "default_crash_initial_max")]
    pub crash_initial_max: u32,

    #[serde(default = "default_crash_restart_max")]
    pub crash_restart_max: u32,

    #[serde(default = "default_action_initial_max")]
    pub action_initial_max: u32,

    #[serde(default = "default_action_after_quit_max")]
    pub action_after_quit_max: u32,

    #[serde(default = "default_action_after_enter_max")]
    pub action_after_enter_max: u32,

    /// Upper bound of the random pause between driver ticks.
    #[serde(default = "default_tick_max_ms")]
    pub tick_max_ms: u64,

    /// Interval of the cluster-state summary log line.
    #[serde(default = "default_observer_interval_ms")]
    pub observer_interval_ms: u64,
}

fn default_node_count() -> usize {
    50
}

fn default_quiescence_ms() -> u64 {
    500
}

fn default_cs_hold_ms() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_crash_initial_max() -> u32 {
    10_000
}

fn default_crash_restart_max() -> u32 {
    2_000
}

fn default_action_initial_max() -> u32 {
    1_000
}

fn default_action_after_quit_max() -> u32 {
    1_000
}

fn default_action_after_enter_max() -> u32 {
    100
}

fn default_tick_max_ms() -> u64 {
    10
}

fn default_observer_interval_ms() -> u64 {
    1_000
}

impl Default for TopologySection {
    fn default() -> Self {
        Self {
            count: default_node_count(),
            shape: TopologyShape::default(),
            seed: None,
        }
    }
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            cs_hold_ms: default_cs_hold_ms(),
            auto_quit: default_true(),
        }
    }
}

impl Default for WorkloadSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            crash_initial_max: default_crash_initial_max(),
            crash_restart_max: default_crash_restart_max(),
            action_initial_max: default_action_initial_max(),
            action_after_quit_max: default_action_after_quit_max(),
            action_after_enter_max: default_action_after_enter_max(),
            tick_max_ms: default_tick_max_ms(),
            observer_interval_ms: default_observer_interval_ms(),
        }
    }
}

impl SimConfig {
    /// Load and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: SimConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.topology.count >= 1, "topology.count must be at least 1");
        ensure!(
            self.protocol.quiescence_ms >= 1,
            "protocol.quiescence_ms must be at least 1"
        );
        if self.protocol.auto_quit {
            ensure!(
                self.protocol.cs_hold_ms >= 1,
                "protocol.cs_hold_ms must be at least 1 when auto_quit is set"
            );
        }
        if self.workload.enabled {
            ensure!(
                self.workload.crash_initial_max >= 1
                    && self.workload.crash_restart_max >= 1
                    && self.workload.action_initial_max >= 1
                    && self.workload.action_after_quit_max >= 1
                    && self.workload.action_after_enter_max >= 1,
                "workload countdown bounds must be at least 1"
            );
            ensure!(
                self.workload.tick_max_ms >= 1,
                "workload.tick_max_ms must be at least 1"
            );
        }
        Ok(())
    }

    /// Per-node runtime settings derived from the protocol section.
    pub fn node_runtime(&self) -> NodeRuntimeConfig {
        NodeRuntimeConfig {
            quiescence: Duration::from_millis(self.protocol.quiescence_ms),
            auto_quit: self
                .protocol
                .auto_quit
                .then(|| Duration::from_millis(self.protocol.cs_hold_ms)),
        }
    }
}
