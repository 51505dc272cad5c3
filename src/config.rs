use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A configuration the gateway cannot run with.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be greater than 0")]
    ZeroChunkSize,
    #[error("outgoing_buffer must be greater than 0")]
    ZeroOutgoingBuffer,
}

/// Gateway configuration, loaded from an optional JSON file.
///
/// Every field has a default so an empty object (or no file at all) yields a
/// working local setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding one sub-directory per site (the tenant roots)
    #[serde(default = "default_sites_path")]
    pub sites_path: PathBuf,
    /// Site used for loopback requests that carry no site header
    #[serde(default)]
    pub default_site: Option<String>,
    #[serde(default = "default_site_header")]
    pub site_header: String,
    /// Fixed backend base URL; derived from each request when unset
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default = "default_identity_path")]
    pub identity_path: String,
    #[serde(default = "default_doc_auth_path")]
    pub doc_auth_path: String,
    #[serde(default = "default_task_log_path")]
    pub task_log_path: String,
    /// Full task log store URL, overrides `task_log_path`
    #[serde(default)]
    pub task_log_url: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_mqtt_broker")]
    pub mqtt_broker: String,
    #[serde(default = "default_events_topic")]
    pub events_topic: String,
    /// Upload slice size agreed with the client
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Frames queued per connection before new ones are dropped
    #[serde(default = "default_outgoing_buffer")]
    pub outgoing_buffer: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_sites_path() -> PathBuf {
    PathBuf::from("sites")
}

fn default_site_header() -> String {
    "x-frappe-site-name".to_string()
}

fn default_identity_path() -> String {
    "/api/method/realtime.get_user_info".to_string()
}

fn default_doc_auth_path() -> String {
    "/api/method/realtime.can_subscribe_doc".to_string()
}

fn default_task_log_path() -> String {
    "/api/method/realtime.get_task_log".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_mqtt_broker() -> String {
    "localhost:1883".to_string()
}

fn default_events_topic() -> String {
    "events".to_string()
}

fn default_chunk_size() -> usize {
    24_576
}

fn default_outgoing_buffer() -> usize {
    256
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sites_path: default_sites_path(),
            default_site: None,
            site_header: default_site_header(),
            backend_url: None,
            identity_path: default_identity_path(),
            doc_auth_path: default_doc_auth_path(),
            task_log_path: default_task_log_path(),
            task_log_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            mqtt_broker: default_mqtt_broker(),
            events_topic: default_events_topic(),
            chunk_size: default_chunk_size(),
            outgoing_buffer: default_outgoing_buffer(),
        }
    }
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Fill `default_site` from `<sites_path>/currentsite.txt` when the
    /// config does not name one.
    pub fn resolve_default_site(&mut self) {
        if self.default_site.is_some() {
            return;
        }
        let current = self.sites_path.join("currentsite.txt");
        if let Ok(content) = std::fs::read_to_string(&current) {
            let site = content.trim();
            if !site.is_empty() {
                tracing::info!("Default site {} read from {:?}", site, current);
                self.default_site = Some(site.to_string());
            }
        }
    }

    /// Reject values that would stall uploads or every connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.outgoing_buffer == 0 {
            return Err(ConfigError::ZeroOutgoingBuffer);
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Directory a site's public and private files live under.
    pub fn site_root(&self, site: &str) -> PathBuf {
        self.sites_path.join(site)
    }
}
