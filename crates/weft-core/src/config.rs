//! Configuration schema for the weft control plane

use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a weft process
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WeftConfig {
    /// Node registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Router/scheduler configuration
    #[serde(default)]
    pub router: RouterConfig,

    /// Offline queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Configuration for the node registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Heartbeat age under which a node is `active`
    #[serde(with = "humantime_secs")]
    pub active_ttl: Duration,

    /// Heartbeat age under which a node is `warning`; older is `offline`
    #[serde(with = "humantime_secs")]
    pub warning_ttl: Duration,

    /// Maximum number of node records the registry will hold
    pub max_nodes: usize,

    /// Capacity of the registration event broadcast channel
    pub event_capacity: usize,
}

/// Configuration for the router/scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Consecutive failures before a node's breaker opens
    pub failure_threshold: u32,

    /// How long an open breaker stays open before admitting one trial
    #[serde(with = "humantime_secs")]
    pub breaker_cooldown: Duration,

    /// Deadline for a generation dispatch
    #[serde(with = "humantime_secs")]
    pub dispatch_timeout: Duration,

    /// Deadline for a health probe
    #[serde(with = "humantime_secs")]
    pub probe_timeout: Duration,

    /// Seconds per 100 output units on an accelerator-equipped node
    pub accel_unit_time: f64,

    /// Seconds per 100 output units on a CPU-only node
    pub cpu_unit_time: f64,

    /// Queueing delay charged per active job on a candidate, in seconds
    pub per_job_wait: f64,

    /// Latency assumed between nodes that share a zone, in seconds
    pub zone_latency: f64,

    /// Latency assumed between nodes with no grouping information, in seconds
    pub default_latency: f64,

    /// Bound on the candidate fallback loop
    #[serde(default)]
    pub fallback: RetryPolicy,
}

/// Configuration for the durable offline queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding queue entries and the drop audit log
    pub data_dir: PathBuf,

    /// Replay policy: `interval` paces the sync ticks, `max_attempts` is
    /// the default retry budget for tasks that do not carry their own
    #[serde(default)]
    pub replay: RetryPolicy,

    /// Number of entries examined per sync tick
    pub batch_size: usize,
}

/// Configuration for the HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the REST surface
    pub bind_address: String,

    /// Name this control-plane process reports as the routing origin
    pub node_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            active_ttl: Duration::from_secs(120),
            warning_ttl: Duration::from_secs(300),
            max_nodes: 1024,
            event_capacity: 256,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            breaker_cooldown: Duration::from_secs(60),
            dispatch_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            accel_unit_time: 0.5,
            cpu_unit_time: 5.0,
            per_job_wait: 2.0,
            zone_latency: 0.01,
            default_latency: 0.05,
            fallback: RetryPolicy::new(8, Duration::from_millis(0)),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/queue"),
            replay: RetryPolicy::default(),
            batch_size: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7400".to_string(),
            node_name: "weft-agent".to_string(),
        }
    }
}

impl WeftConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: WeftConfig = serde_yaml::from_str(&data)?;
        config.validate().map_err(Error::config)?;
        Ok(config)
    }

    /// Set the queue data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queue.data_dir = dir.into();
        self
    }

    /// Set the server bind address
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.server.bind_address = addr.into();
        self
    }

    /// Set the reported origin node name
    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.server.node_name = name.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.registry.active_ttl.is_zero() {
            return Err("registry active_ttl must be greater than zero".to_string());
        }
        if self.registry.warning_ttl <= self.registry.active_ttl {
            return Err("registry warning_ttl must be greater than active_ttl".to_string());
        }
        if self.registry.max_nodes == 0 {
            return Err("registry max_nodes must be greater than zero".to_string());
        }
        if self.router.failure_threshold == 0 {
            return Err("router failure_threshold must be greater than zero".to_string());
        }
        if self.router.dispatch_timeout.is_zero() || self.router.probe_timeout.is_zero() {
            return Err("router timeouts must be greater than zero".to_string());
        }
        if self.router.cpu_unit_time <= self.router.accel_unit_time {
            return Err(
                "router cpu_unit_time must exceed accel_unit_time (accelerated nodes model higher throughput)"
                    .to_string(),
            );
        }
        if self.queue.batch_size == 0 {
            return Err("queue batch_size must be greater than zero".to_string());
        }
        if self.queue.replay.interval.is_zero() {
            return Err("queue replay interval must be greater than zero".to_string());
        }
        if self.queue.replay.max_attempts == 0 {
            return Err("queue replay max_attempts must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Serialize Durations as whole seconds so config files read naturally.
pub(crate) mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WeftConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.router.failure_threshold, 3);
        assert_eq!(config.queue.batch_size, 10);
    }

    #[test]
    fn test_validation_catches_inverted_ttls() {
        let mut config = WeftConfig::default();
        config.registry.warning_ttl = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_catches_inverted_unit_times() {
        let mut config = WeftConfig::default();
        config.router.cpu_unit_time = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = WeftConfig::default()
            .with_bind_address("127.0.0.1:7411")
            .with_node_name("control-1");
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: WeftConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.server.bind_address, "127.0.0.1:7411");
        assert_eq!(back.registry.active_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "server:\n  bind_address: \"0.0.0.0:9999\"\n  node_name: \"edge\"\n";
        let config: WeftConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:9999");
        assert_eq!(config.queue.replay.max_attempts, 5);
        assert_eq!(config.queue.replay.interval, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_catches_zero_replay_interval() {
        let mut config = WeftConfig::default();
        config.queue.replay = RetryPolicy::new(5, Duration::from_secs(0));
        assert!(config.validate().is_err());

        config.queue.replay = RetryPolicy::new(0, Duration::from_secs(30));
        assert!(config.validate().is_err());
    }
}
