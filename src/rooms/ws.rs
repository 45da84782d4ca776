use axum::{debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};

use crate::{event::ClientEvent, hub::Hub};

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(hub): State<Hub>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_connection(hub, stream))
}

/// Runs one participant's session: a writer task drains the hub outbox into
/// the socket while this task feeds inbound frames to the hub.
async fn serve_connection(hub: Hub, stream: WebSocket) {
    let (id, mut outbox) = hub.connect();
    let (mut sender, mut receiver) = stream.split();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(conn = %id, %err, "unserializable event");
                    continue;
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };

                match frame {
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                    msg => {
                        let Ok(event) = serde_json::from_slice::<ClientEvent>(&msg.into_data()) else {
                            tracing::debug!(conn = %id, "unparseable frame");
                            continue
                        };

                        if let Err(err) = hub.handle(id, event) {
                            tracing::debug!(conn = %id, %err, "event ignored");
                        }
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    hub.disconnect(id);
    writer.abort();
}
