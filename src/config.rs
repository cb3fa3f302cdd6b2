// Per-node configuration
//
// Every node reads a properties file (`key=value` lines, `#` comments) at
// startup. Unset keys fall back to the defaults below. Service ports beyond
// the base port are derived by a fixed offset per service kind.

use crate::error::{FlockError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port offset added to the base service port, per service kind.
pub const POSTS_PORT_OFFSET: u16 = 0;
pub const MESSAGES_PORT_OFFSET: u16 = 100;
pub const FOLLOW_PORT_OFFSET: u16 = 200;
pub const USERS_PORT_OFFSET: u16 = 300;

// Seed peer from the `seed.servers` list, `id:host:port` where the port is
// the peer's sync port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedServer {
    pub node_id: String,
    pub host: String,
    pub sync_port: u16,
}

impl SeedServer {
    fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.trim().splitn(3, ':');
        let node_id = parts.next().unwrap_or_default();
        let host = parts.next().unwrap_or_default();
        let port = parts.next().unwrap_or_default();
        if node_id.is_empty() || host.is_empty() || port.is_empty() {
            return Err(FlockError::Configuration(format!(
                "invalid seed server entry '{}', expected id:host:port",
                raw
            )));
        }
        let sync_port = port.parse::<u16>().map_err(|_| {
            FlockError::Configuration(format!("invalid seed server port in '{}'", raw))
        })?;
        Ok(Self {
            node_id: node_id.to_string(),
            host: host.to_string(),
            sync_port,
        })
    }
}

// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Node identifier, the tie-break for leader election
    pub server_id: String,
    /// Host this node is reachable at
    pub server_address: String,
    /// Base service port; the four service listeners derive from it
    pub server_port: u16,
    /// Control-plane port (bind retry may shift it up to +4)
    pub sync_port: u16,
    /// Berkeley round interval
    pub sync_interval: Duration,
    /// Coordinator check / heartbeat interval
    pub coordinator_check_interval: Duration,
    /// Balancer role instead of backend role
    pub is_balancer: bool,
    /// Client-facing router port (balancer role only)
    pub balancer_port: u16,
    /// Peers known at boot
    pub seed_servers: Vec<SeedServer>,
    /// Node state and default repository directory
    pub data_directory: PathBuf,
    /// Explicit users service port. Unset means the offset rule applies
    /// (server.port + 300); a literal default would collide with the
    /// posts listener on a from-defaults boot.
    pub user_service_port: Option<u16>,
    pub user_data_directory: Option<PathBuf>,
    pub post_data_directory: Option<PathBuf>,
    pub message_data_directory: Option<PathBuf>,

    // Tuning knobs with fixed defaults; not part of the properties surface
    // but settable by tests.
    pub ping_interval: Duration,
    pub announce_delay: Duration,
    pub election_response_window: Duration,
    pub berkeley_collect_window: Duration,
    pub retry_suppression_window: Duration,
    pub send_timeout: Duration,
    pub request_timeout: Duration,
    pub replication_idle_sleep: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_id: random_node_id(),
            server_address: "127.0.0.1".to_string(),
            server_port: 5555,
            sync_port: 6000,
            sync_interval: Duration::from_millis(60_000),
            coordinator_check_interval: Duration::from_millis(30_000),
            is_balancer: false,
            balancer_port: 5000,
            seed_servers: Vec::new(),
            data_directory: PathBuf::from("./data"),
            user_service_port: None,
            user_data_directory: None,
            post_data_directory: None,
            message_data_directory: None,
            ping_interval: Duration::from_secs(15),
            announce_delay: Duration::from_secs(8),
            election_response_window: Duration::from_secs(5),
            berkeley_collect_window: Duration::from_secs(3),
            retry_suppression_window: Duration::from_secs(10),
            send_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(3),
            replication_idle_sleep: Duration::from_millis(50),
        }
    }
}

impl NodeConfig {
    /// Load a properties file and overlay it on the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_properties(&raw)
    }

    pub fn from_properties(raw: &str) -> Result<Self> {
        let mut props: HashMap<&str, &str> = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                FlockError::Configuration(format!("malformed property line '{}'", line))
            })?;
            props.insert(key.trim(), value.trim());
        }

        let mut config = Self::default();
        for (key, value) in props {
            match key {
                "server.id" => config.server_id = value.to_string(),
                "server.address" => config.server_address = value.to_string(),
                "server.port" => config.server_port = parse_port(key, value)?,
                "sync.port" => config.sync_port = parse_port(key, value)?,
                "sync.interval.ms" => {
                    config.sync_interval = Duration::from_millis(parse_millis(key, value)?)
                }
                "coordinator.check.interval.ms" => {
                    config.coordinator_check_interval =
                        Duration::from_millis(parse_millis(key, value)?)
                }
                "is.balancer" => {
                    config.is_balancer = value.eq_ignore_ascii_case("true");
                }
                "balancer.port" => config.balancer_port = parse_port(key, value)?,
                "seed.servers" => {
                    config.seed_servers = value
                        .split(',')
                        .filter(|s| !s.trim().is_empty())
                        .map(SeedServer::parse)
                        .collect::<Result<Vec<_>>>()?;
                }
                "data.directory" => config.data_directory = PathBuf::from(value),
                "user.service.port" => config.user_service_port = Some(parse_port(key, value)?),
                "user.data.directory" => config.user_data_directory = Some(PathBuf::from(value)),
                "post.data.directory" => config.post_data_directory = Some(PathBuf::from(value)),
                "message.data.directory" => {
                    config.message_data_directory = Some(PathBuf::from(value))
                }
                other => {
                    tracing::warn!("ignoring unrecognized configuration key '{}'", other);
                }
            }
        }
        Ok(config)
    }

    pub fn posts_port(&self) -> u16 {
        self.server_port + POSTS_PORT_OFFSET
    }

    pub fn messages_port(&self) -> u16 {
        self.server_port + MESSAGES_PORT_OFFSET
    }

    pub fn follow_port(&self) -> u16 {
        self.server_port + FOLLOW_PORT_OFFSET
    }

    pub fn users_port(&self) -> u16 {
        self.user_service_port
            .unwrap_or(self.server_port + USERS_PORT_OFFSET)
    }

    /// Directory holding a repository file, honoring the per-entity override.
    pub fn repo_directory(&self, override_dir: &Option<PathBuf>) -> PathBuf {
        override_dir.clone().unwrap_or_else(|| self.data_directory.clone())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .map_err(|_| FlockError::Configuration(format!("invalid port for '{}': {}", key, value)))
}

fn parse_millis(key: &str, value: &str) -> Result<u64> {
    value.parse::<u64>().map_err(|_| {
        FlockError::Configuration(format!("invalid millisecond value for '{}': {}", key, value))
    })
}

fn random_node_id() -> String {
    format!("node-{:08x}", rand::random::<u32>())
}
