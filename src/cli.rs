//! Command line arguments for the gateway binaries.

use crate::config::GatewayConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "realtime-gateway", about = "Realtime websocket gateway")]
pub struct GatewayArgs {
    /// JSON config file; every field is optional
    #[arg(long, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "GATEWAY_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Directory containing one folder per site
    #[arg(long, env = "GATEWAY_SITES_PATH")]
    pub sites_path: Option<PathBuf>,

    /// Site used for requests to localhost without a site header
    #[arg(long, env = "GATEWAY_DEFAULT_SITE")]
    pub default_site: Option<String>,

    /// Fixed backend base URL for identity, authorization and task log calls
    #[arg(long, env = "GATEWAY_BACKEND_URL")]
    pub backend_url: Option<String>,

    #[arg(long, env = "GATEWAY_MQTT_BROKER")]
    pub mqtt_broker: Option<String>,

    #[arg(long, env = "GATEWAY_EVENTS_TOPIC")]
    pub events_topic: Option<String>,

    /// Upload slice size in bytes, must match the client
    #[arg(long, env = "GATEWAY_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,
}

impl GatewayArgs {
    /// Overlay command line values onto a loaded config.
    pub fn apply(&self, config: &mut GatewayConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(sites_path) = &self.sites_path {
            config.sites_path = sites_path.clone();
        }
        if let Some(site) = &self.default_site {
            config.default_site = Some(site.clone());
        }
        if let Some(url) = &self.backend_url {
            config.backend_url = Some(url.clone());
        }
        if let Some(broker) = &self.mqtt_broker {
            config.mqtt_broker = broker.clone();
        }
        if let Some(topic) = &self.events_topic {
            config.events_topic = topic.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "realtime-publish",
    about = "Publish an event to the gateway broadcast channel"
)]
pub struct PublishArgs {
    /// Event name delivered to clients
    #[arg(long)]
    pub event: String,

    /// JSON payload
    #[arg(long, default_value = "{}")]
    pub message: String,

    /// Target room, e.g. site1:doc:Invoice/INV-1; every connection if omitted
    #[arg(long)]
    pub room: Option<String>,

    #[arg(long, env = "GATEWAY_MQTT_BROKER", default_value = "localhost:1883")]
    pub mqtt_broker: String,

    #[arg(long, env = "GATEWAY_EVENTS_TOPIC", default_value = "events")]
    pub topic: String,
}
