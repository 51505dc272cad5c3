//! realtime-publish: Publish an event to every gateway subscribed to the
//! broadcast topic
//!
//! Usage:
//!   realtime-publish --event list_update --message '{"doctype": "ToDo"}'
//!   realtime-publish --event doc_update --room 'site1:doc:ToDo/TD-0001'

use clap::Parser;
use realtime_gateway::{
    cli::PublishArgs,
    mqtt::{MqttClient, MqttConfig},
};
use rumqttc::QoS;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = PublishArgs::parse();

    let message: serde_json::Value =
        serde_json::from_str(&args.message).map_err(|e| format!("Invalid JSON message: {}", e))?;

    let mut envelope = serde_json::json!({
        "event": args.event,
        "message": message,
    });
    if let Some(room) = &args.room {
        envelope["room"] = serde_json::Value::String(room.clone());
    }

    let config = MqttConfig {
        broker_url: args.mqtt_broker.clone(),
        client_id: format!("realtime-publish-{}", uuid::Uuid::new_v4()),
        ..Default::default()
    };
    let client = Arc::new(MqttClient::connect(config).await?);

    let loop_client = client.clone();
    let loop_handle = tokio::spawn(async move {
        let _ = tokio::time::timeout(Duration::from_secs(2), loop_client.run_event_loop()).await;
    });

    tokio::time::sleep(Duration::from_millis(500)).await;

    let payload = serde_json::to_vec(&envelope)?;
    client.publish(&args.topic, &payload, QoS::AtLeastOnce).await?;

    println!(
        "Published {} to {}",
        args.event,
        args.room.as_deref().unwrap_or("all connections")
    );

    // Wait for PUBACK
    tokio::time::sleep(Duration::from_millis(500)).await;
    loop_handle.abort();

    Ok(())
}
