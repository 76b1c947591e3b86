//! Harness configuration.
//!
//! Loaded in three layers: built-in defaults, an optional YAML file, then
//! environment overrides (`TASK_ID`, `BASE_URL`, `RESULTS_DIR`,
//! `SCREENSHOTS_DIR`).

use crate::monitor::{RegistryConfig, DEFAULT_MONITOR_LOG_LIMIT};
use crate::recorder::DEFAULT_TRAFFIC_LOG_LIMIT;
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default bridge application URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Endpoints watched by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Route lookup path
    pub route_path: String,
    /// Message construction path
    pub messages_path: String,
    /// JSON-RPC method carrying the simulation
    pub simulation_method: String,
    /// `params.path` of the simulation query
    pub simulation_param_path: String,
    /// JSON-RPC method used to broadcast
    pub broadcast_method: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            route_path: "/v2/fungible/route".to_string(),
            messages_path: "/v2/fungible/msgs".to_string(),
            simulation_method: "abci_query".to_string(),
            simulation_param_path: "/cosmos.tx.v1beta1.Service/Simulate".to_string(),
            broadcast_method: "broadcast_tx_sync".to_string(),
        }
    }
}

/// Per-step timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Route response
    pub route_ms: u64,
    /// Messages response
    pub messages_ms: u64,
    /// Simulation response
    pub simulation_ms: u64,
    /// Broadcast response
    pub broadcast_ms: u64,
    /// UI element waits
    pub ui_ms: u64,
    /// Wallet connection
    pub wallet_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            route_ms: 30_000,
            messages_ms: 30_000,
            simulation_ms: 60_000,
            broadcast_ms: 120_000,
            ui_ms: 10_000,
            wallet_ms: 15_000,
        }
    }
}

impl TimeoutConfig {
    fn named(&self) -> [(&'static str, u64); 6] {
        [
            ("route_ms", self.route_ms),
            ("messages_ms", self.messages_ms),
            ("simulation_ms", self.simulation_ms),
            ("broadcast_ms", self.broadcast_ms),
            ("ui_ms", self.ui_ms),
            ("wallet_ms", self.wallet_ms),
        ]
    }

    /// Route timeout
    #[must_use]
    pub const fn route(&self) -> Duration {
        Duration::from_millis(self.route_ms)
    }

    /// Messages timeout
    #[must_use]
    pub const fn messages(&self) -> Duration {
        Duration::from_millis(self.messages_ms)
    }

    /// Simulation timeout
    #[must_use]
    pub const fn simulation(&self) -> Duration {
        Duration::from_millis(self.simulation_ms)
    }

    /// Broadcast timeout
    #[must_use]
    pub const fn broadcast(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms)
    }
}

/// Configuration for one harness run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Identifier embedded in result and screenshot names
    pub task_id: String,
    /// Bridge application URL
    pub base_url: String,
    /// Where result JSON is written
    pub results_dir: PathBuf,
    /// Where screenshots are written
    pub screenshots_dir: PathBuf,
    /// Watched endpoints
    pub endpoints: EndpointConfig,
    /// Step timeouts
    pub timeouts: TimeoutConfig,
    /// Events kept in the global traffic log
    pub traffic_log_limit: usize,
    /// Events kept per monitor
    pub monitor_log_limit: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            task_id: "local".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            results_dir: PathBuf::from("results"),
            screenshots_dir: PathBuf::from("screenshots"),
            endpoints: EndpointConfig::default(),
            timeouts: TimeoutConfig::default(),
            traffic_log_limit: DEFAULT_TRAFFIC_LOG_LIMIT,
            monitor_log_limit: DEFAULT_MONITOR_LOG_LIMIT,
        }
    }
}

impl HarnessConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> ProbeResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML; missing fields keep their defaults
    pub fn from_yaml_str(yaml: &str) -> ProbeResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: &Path) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Serialize as YAML
    pub fn to_yaml(&self) -> ProbeResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply environment overrides through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(task_id) = get("TASK_ID") {
            self.task_id = task_id;
        }
        if let Some(base_url) = get("BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(dir) = get("RESULTS_DIR") {
            self.results_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("SCREENSHOTS_DIR") {
            self.screenshots_dir = PathBuf::from(dir);
        }
    }

    /// Set the task id
    #[must_use]
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set both output directories
    #[must_use]
    pub fn with_output_dirs(
        mut self,
        results_dir: impl Into<PathBuf>,
        screenshots_dir: impl Into<PathBuf>,
    ) -> Self {
        self.results_dir = results_dir.into();
        self.screenshots_dir = screenshots_dir.into();
        self
    }

    /// Set the timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> ProbeResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ProbeError::config("base_url must not be empty"));
        }
        if self.task_id.trim().is_empty() {
            return Err(ProbeError::config("task_id must not be empty"));
        }
        if let Some((name, _)) = self.timeouts.named().into_iter().find(|(_, ms)| *ms == 0) {
            return Err(ProbeError::config(format!(
                "timeouts.{name} must be greater than zero"
            )));
        }
        if self.traffic_log_limit == 0 || self.monitor_log_limit == 0 {
            return Err(ProbeError::config("log limits must be greater than zero"));
        }
        Ok(())
    }

    /// Registry settings derived from this configuration
    #[must_use]
    pub const fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            traffic_log_limit: self.traffic_log_limit,
            monitor_log_limit: self.monitor_log_limit,
        }
    }
}
