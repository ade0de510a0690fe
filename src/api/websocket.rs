//! WebSocket handler for live measurement streams

use std::sync::Arc;

use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::actors::hub::{HubHandle, Subscription};
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};

/// WebSocket upgrade handler
///
/// GET /checks/:check_id/stream
///
/// The subscriber is registered before the upgrade completes, so every
/// measurement broadcast after the handshake reaches the client.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    Path(check_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Response> {
    let (subscription, payloads) = state
        .hub
        .subscribe(check_id, state.subscriber_buffer)
        .await
        .map_err(|e| ApiError::Unavailable(format!("{e:#}")))?;

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| forward(socket, hub, subscription, payloads)))
}

/// Forward hub payloads to the client until either side goes away
async fn forward(
    socket: WebSocket,
    hub: HubHandle,
    subscription: Subscription,
    mut payloads: mpsc::Receiver<Arc<str>>,
) {
    info!(
        "stream client connected to check {} as subscriber {}",
        subscription.check_id, subscription.id
    );

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            payload = payloads.recv() => {
                let Some(payload) = payload else {
                    debug!("hub dropped subscriber {}", subscription.id);
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };

                if sender.send(Message::Text(payload.to_string())).await.is_err() {
                    debug!("WebSocket send failed, client disconnected");
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pongs are sent by axum; client messages carry no meaning.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let id = subscription.id;
    if let Err(e) = hub.unregister(subscription).await {
        debug!("could not unregister subscriber {id}: {e:#}");
    }

    info!("stream client {id} disconnected");
}
