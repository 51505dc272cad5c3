//! Relays events published by backend workers into local rooms.
//!
//! The bridge keeps no state between messages, so any number of gateway
//! instances can subscribe to the same topic. Ordering holds only within the
//! single subscription stream this instance receives.

use crate::gateway::Gateway;
use crate::mqtt::{MqttClient, MqttError};
use crate::ws::protocol::ServerEvent;
use rumqttc::{Event, Packet, QoS, SubscribeReasonCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Error from the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("mqtt: {0}")]
    Mqtt(#[from] MqttError),
    #[error("broker rejected subscription to {0}")]
    SubscribeRejected(String),
}

/// A message published by a backend process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BroadcastEnvelope {
    pub event: String,
    #[serde(default, alias = "payload")]
    pub message: serde_json::Value,
    /// Target room; every connection when absent
    #[serde(default)]
    pub room: Option<String>,
}

impl BroadcastEnvelope {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn target_room(&self) -> Option<&str> {
        self.room.as_deref().filter(|r| !r.is_empty())
    }
}

/// Deliver one raw message. Malformed payloads are logged and dropped.
/// Returns the number of connections the event was queued for.
pub fn relay(gateway: &Gateway, payload: &[u8]) -> Option<usize> {
    let envelope = match BroadcastEnvelope::parse(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                "Dropping malformed broadcast ({} bytes): {}",
                payload.len(),
                e
            );
            return None;
        }
    };

    let event = ServerEvent::new(envelope.event.clone(), envelope.message.clone());
    let delivered = gateway.broadcast(envelope.target_room(), &event);
    tracing::debug!(
        "Bridged {} to {} ({} connections)",
        envelope.event,
        envelope.target_room().unwrap_or("everyone"),
        delivered
    );
    Some(delivered)
}

pub struct EventBridge {
    gateway: Arc<Gateway>,
    client: MqttClient,
    topic: String,
}

impl EventBridge {
    pub fn new(gateway: Arc<Gateway>, client: MqttClient, topic: impl Into<String>) -> Self {
        Self {
            gateway,
            client,
            topic: topic.into(),
        }
    }

    /// Drain the broadcast topic forever.
    ///
    /// Returns only when the first connection or subscription fails. Once
    /// subscribed, connection errors are logged and retried, and every
    /// reconnect re-subscribes.
    pub async fn run(self) -> Result<(), BridgeError> {
        let mut subscribed = false;

        loop {
            match self.client.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!("Connected to broker, subscribing to {}", self.topic);
                    self.client.subscribe(&self.topic, QoS::AtMostOnce).await?;
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    let rejected = ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure));
                    if rejected {
                        if !subscribed {
                            return Err(BridgeError::SubscribeRejected(self.topic.clone()));
                        }
                        tracing::warn!("Broker rejected re-subscription to {}", self.topic);
                    } else {
                        subscribed = true;
                        tracing::info!("Subscribed to {}", self.topic);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == self.topic {
                        relay(&self.gateway, &publish.payload);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if !subscribed {
                        return Err(e.into());
                    }
                    tracing::warn!("Broker connection error, retrying: {}", e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}
