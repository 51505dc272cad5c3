use super::connection::OutgoingMessage;
use super::protocol::decode_client_event;
use crate::gateway::Gateway;
use crate::tenant::ConnectRequest;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(gateway): State<Arc<Gateway>>,
) -> Response {
    let request = ConnectRequest::from_headers(&headers, &gateway.config().site_header);
    ws.on_upgrade(move |socket| handle_socket(socket, request, gateway))
}

async fn handle_socket(socket: WebSocket, request: ConnectRequest, gateway: Arc<Gateway>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(gateway.config().outgoing_buffer);

    // The upgrade is already accepted; identity resolves before any client
    // event is read.
    let conn_id = gateway.connect(&request, tx).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(OutgoingMessage::Event(event)) = rx.recv().await {
            if sink.send(Message::Text(event.to_text())).await.is_err() {
                break;
            }
        }
    });

    let recv_gateway = gateway.clone();
    let recv_id = conn_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };

            let event = match decode_client_event(&text) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Connection {} sent an unusable frame: {}", recv_id, e);
                    continue;
                }
            };

            if event.awaits_collaborator() {
                let gateway = recv_gateway.clone();
                let conn_id = recv_id.clone();
                tokio::spawn(async move { gateway.handle_event(&conn_id, event).await });
            } else {
                recv_gateway.handle_event(&recv_id, event).await;
            }
        }
    });

    // Wait for either side to finish and stop the other
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    gateway.disconnect(&conn_id);
}
