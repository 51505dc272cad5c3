//! Thin wrapper over `rumqttc` used by the event bridge and the publisher.

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_PORT: u16 = 1883;

/// Error from the MQTT layer.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("invalid broker address: {0}")]
    InvalidBroker(String),
    #[error("client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// `host:port`, optionally prefixed with `mqtt://` or `tcp://`
    pub broker_url: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Requests buffered between the client and its event loop
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "localhost:1883".to_string(),
            client_id: format!("realtime-gateway-{}", uuid::Uuid::new_v4()),
            keep_alive_secs: 30,
            channel_capacity: 64,
        }
    }
}

/// Split a broker URL into host and port.
pub fn parse_broker(broker_url: &str) -> Result<(String, u16), MqttError> {
    let address = broker_url
        .strip_prefix("mqtt://")
        .or_else(|| broker_url.strip_prefix("tcp://"))
        .unwrap_or(broker_url)
        .trim_end_matches('/');

    if address.is_empty() {
        return Err(MqttError::InvalidBroker(broker_url.to_string()));
    }

    match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| MqttError::InvalidBroker(broker_url.to_string()))?;
            if host.is_empty() {
                return Err(MqttError::InvalidBroker(broker_url.to_string()));
            }
            Ok((host.to_string(), port))
        }
        None => Ok((address.to_string(), DEFAULT_PORT)),
    }
}

pub struct MqttClient {
    client: AsyncClient,
    event_loop: Mutex<EventLoop>,
}

impl MqttClient {
    /// Create the client. The network connection is made lazily by the
    /// event loop, so callers must keep polling it.
    pub async fn connect(config: MqttConfig) -> Result<Self, MqttError> {
        let (host, port) = parse_broker(&config.broker_url)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, event_loop) = AsyncClient::new(options, config.channel_capacity);
        tracing::debug!(
            "MQTT client {} configured for {}",
            config.client_id,
            config.broker_url
        );

        Ok(Self {
            client,
            event_loop: Mutex::new(event_loop),
        })
    }

    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), MqttError> {
        self.client.subscribe(topic, qos).await?;
        Ok(())
    }

    pub async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), MqttError> {
        self.client
            .publish(topic, qos, false, payload.to_vec())
            .await?;
        Ok(())
    }

    /// Drive the connection one step.
    pub async fn poll(&self) -> Result<Event, MqttError> {
        let mut event_loop = self.event_loop.lock().await;
        Ok(event_loop.poll().await?)
    }

    /// Poll until the connection fails.
    pub async fn run_event_loop(&self) -> Result<(), MqttError> {
        loop {
            self.poll().await?;
        }
    }
}
