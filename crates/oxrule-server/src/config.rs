use oxrule_ruler::RulerConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Prometheus-compatible query API base URL backing rule evaluation.
    pub query_url: String,
    /// Ingestion endpoint receiving recording rule output.
    pub push_url: String,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Directory holding configured rules, laid out as
    /// `<store_dir>/<tenant>/<namespace>`.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    #[serde(default)]
    pub ruler: RulerConfig,
    #[serde(default)]
    pub ring: RingConfig,
}

#[derive(Debug, Deserialize)]
pub struct RingConfig {
    /// Address advertised to other replicas; defaults to the gRPC port on
    /// the loopback interface.
    #[serde(default)]
    pub advertise_addr: Option<String>,
    #[serde(default = "default_num_tokens")]
    pub num_tokens: usize,
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            advertise_addr: None,
            num_tokens: default_num_tokens(),
            heartbeat_period_secs: default_heartbeat_period_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

fn default_grpc_port() -> u16 {
    9095
}

fn default_http_port() -> u16 {
    9096
}

fn default_query_timeout_secs() -> u64 {
    30
}

fn default_store_dir() -> String {
    "data/rules".to_string()
}

fn default_num_tokens() -> usize {
    128
}

fn default_heartbeat_period_secs() -> u64 {
    5
}

fn default_heartbeat_timeout_secs() -> u64 {
    60
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
