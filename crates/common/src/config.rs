use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level gateway configuration, loaded from a JSON document with
/// environment overrides applied on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_ports")]
    pub listen_ports: Vec<u16>,
    #[serde(default = "default_upstream")]
    pub upstream_addr: String,
    #[serde(default)]
    pub l3_blacklist: Vec<String>,
    #[serde(default = "default_l4_conn_limit")]
    pub l4_conn_limit: i64,
    #[serde(default = "default_l7_rate_limit")]
    pub l7_rate_limit: f64,
    #[serde(default = "default_l7_burst_limit")]
    pub l7_burst_limit: u64,
    #[serde(default)]
    pub geoip_db_path: String,
    #[serde(default)]
    pub blocked_countries: Vec<String>,
    /// CIDR blocks (or bare IPs) denied outright, independent of the
    /// country database.
    #[serde(default)]
    pub blocked_ranges: Vec<String>,
    #[serde(default = "default_heavy_paths")]
    pub anomaly_heavy_paths: Vec<String>,
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: i64,
    #[serde(default = "default_management_listen")]
    pub management_listen: String,
    #[serde(default = "default_metrics_listen")]
    pub metrics_listen: String,
    #[serde(default)]
    pub redis_addr: String,
    #[serde(default)]
    pub redis_password: String,
    #[serde(default)]
    pub toggles: FeatureFlags,
}

/// Startup values for the live feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub waf: bool,
    #[serde(default = "default_true")]
    pub geoip: bool,
    #[serde(default = "default_true")]
    pub challenge: bool,
    #[serde(default = "default_true")]
    pub anomaly: bool,
    #[serde(default = "default_true")]
    pub stats: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            waf: true,
            geoip: true,
            challenge: true,
            anomaly: true,
            stats: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config must deserialize")
    }
}

fn default_listen_ports() -> Vec<u16> {
    vec![8080]
}
fn default_upstream() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_l4_conn_limit() -> i64 {
    100
}
fn default_l7_rate_limit() -> f64 {
    10.0
}
fn default_l7_burst_limit() -> u64 {
    20
}
fn default_heavy_paths() -> Vec<String> {
    vec!["/search".to_string(), "/api/heavy-export".to_string()]
}
fn default_anomaly_threshold() -> i64 {
    20
}
fn default_management_listen() -> String {
    "127.0.0.1:9091".to_string()
}
fn default_metrics_listen() -> String {
    "127.0.0.1:9090".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a JSON file, then apply environment
    /// overrides. A missing file is not an error (defaults apply); a
    /// malformed file is.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<Self>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path, "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `AEGISEDGE_*` environment overrides on top of the document.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("AEGISEDGE_PORT") {
            if let Ok(port) = val.trim().parse::<u16>() {
                self.listen_ports.push(port);
            }
        }
        if let Ok(val) = std::env::var("AEGISEDGE_PORTS") {
            for part in val.split(',') {
                if let Ok(port) = part.trim().parse::<u16>() {
                    self.listen_ports.push(port);
                }
            }
        }
        if let Ok(val) = std::env::var("AEGISEDGE_UPSTREAM") {
            self.upstream_addr = val;
        }
        if let Ok(val) = std::env::var("AEGISEDGE_L4_CONN_LIMIT") {
            if let Ok(limit) = val.trim().parse::<i64>() {
                self.l4_conn_limit = limit;
            }
        }
        if let Ok(val) = std::env::var("AEGISEDGE_L7_RATE_LIMIT") {
            if let Ok(rate) = val.trim().parse::<f64>() {
                self.l7_rate_limit = rate;
            }
        }
        if let Ok(val) = std::env::var("AEGISEDGE_REDIS_ADDR") {
            self.redis_addr = val;
        }
        if let Ok(val) = std::env::var("AEGISEDGE_REDIS_PASSWORD") {
            self.redis_password = val;
        }

        self.listen_ports.sort_unstable();
        self.listen_ports.dedup();
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen_ports.is_empty() {
            anyhow::bail!("listen_ports must have at least one port");
        }
        if self.upstream_addr.is_empty() {
            anyhow::bail!("upstream_addr must not be empty");
        }
        if self.l7_rate_limit <= 0.0 {
            anyhow::bail!("l7_rate_limit must be positive");
        }
        if self.l7_burst_limit == 0 {
            anyhow::bail!("l7_burst_limit must be at least 1");
        }
        if self.l4_conn_limit <= 0 {
            anyhow::bail!("l4_conn_limit must be positive");
        }
        if self.anomaly_threshold <= 0 {
            anyhow::bail!("anomaly_threshold must be positive");
        }
        Ok(())
    }
}
