//! realtime-gateway: websocket gateway for multi-tenant backend events
//!
//! Accepts browser connections on `/ws`, resolves site and identity for each,
//! and relays events published on the MQTT broadcast topic into rooms.

use clap::Parser;
use realtime_gateway::backend::HttpBackend;
use realtime_gateway::bridge::EventBridge;
use realtime_gateway::cli::GatewayArgs;
use realtime_gateway::config::GatewayConfig;
use realtime_gateway::mqtt::{parse_broker, MqttClient, MqttConfig};
use realtime_gateway::{create_router, Collaborators, Gateway};
use std::future::IntoFuture;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn broker_reachable(broker: &str) -> Result<(), String> {
    let (host, port) = parse_broker(broker).map_err(|e| e.to_string())?;
    let addr = (host.as_str(), port)
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .next()
        .ok_or_else(|| format!("no address for {}", host))?;
    TcpStream::connect_timeout(&addr, Duration::from_secs(5)).map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = GatewayArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("[gateway] Starting realtime-gateway");

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("[gateway] Config file: {:?}", path);
            match GatewayConfig::load(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("[gateway] Failed to load config: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);
    config.resolve_default_site();

    if let Err(e) = config.validate() {
        tracing::error!("[gateway] Invalid config: {}", e);
        std::process::exit(1);
    }

    if let Some(site) = &config.default_site {
        tracing::info!("[gateway] Default site: {}", site);
    }

    tracing::info!("[gateway] Checking MQTT broker at {}", config.mqtt_broker);
    if let Err(e) = broker_reachable(&config.mqtt_broker) {
        tracing::error!(
            "[gateway] Cannot connect to MQTT broker at {}: {}",
            config.mqtt_broker,
            e
        );
        std::process::exit(1);
    }

    let backend = match HttpBackend::new(&config) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            tracing::error!("[gateway] Failed to build backend client: {}", e);
            std::process::exit(1);
        }
    };

    let mqtt = match MqttClient::connect(MqttConfig {
        broker_url: config.mqtt_broker.clone(),
        ..Default::default()
    })
    .await
    {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("[gateway] Failed to create MQTT client: {}", e);
            std::process::exit(1);
        }
    };

    let address = config.server_address();
    let topic = config.events_topic.clone();
    let gateway = Arc::new(Gateway::new(config, Collaborators::http(backend)));
    let bridge = EventBridge::new(gateway.clone(), mqtt, topic);
    let app = create_router(gateway);

    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("[gateway] Failed to bind {}: {}", address, e);
            std::process::exit(1);
        }
    };
    tracing::info!("[gateway] Listening on {}", address);

    tokio::select! {
        result = bridge.run() => {
            if let Err(e) = result {
                tracing::error!("[gateway] Event bridge failed: {}", e);
                std::process::exit(1);
            }
        }
        result = axum::serve(listener, app).into_future() => {
            if let Err(e) = result {
                tracing::error!("[gateway] Server error: {}", e);
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("[gateway] Received Ctrl+C");
        }
    }

    tracing::info!("[gateway] Shutdown complete");
}
