use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::tracker::ResetEvent;

use super::types::StreamFilter;
use super::ApiState;

#[derive(Deserialize)]
struct FilterMessage {
    r#type: String,
    #[serde(flatten)]
    filter: StreamFilter,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub feature: Option<String>,
}

pub async fn ws_reset_stream(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    let filter = StreamFilter {
        feature: query.feature,
    };
    let subscriber = state.reset_tx.subscribe();

    ws.on_upgrade(move |socket| handle_reset_stream(socket, subscriber, filter))
}

async fn handle_reset_stream(
    socket: WebSocket,
    mut subscriber: broadcast::Receiver<ResetEvent>,
    initial_filter: StreamFilter,
) {
    let connection_id = Uuid::new_v4();
    info!(
        %connection_id,
        feature_filter = initial_filter.feature.as_deref().unwrap_or("*"),
        "reset stream connection established"
    );

    let (sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
    let filter_state = Arc::new(RwLock::new(initial_filter));

    let mut sink_task = tokio::spawn({
        let mut sink = sink;
        async move {
            while let Some(message) = out_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut broadcast_task = tokio::spawn({
        let out_tx = out_tx.clone();
        let filter_state = Arc::clone(&filter_state);

        async move {
            let ready = serde_json::json!({
                "type": "connected",
                "message": "Reset stream ready"
            });
            if out_tx.send(Message::Text(ready.to_string())).await.is_err() {
                return;
            }

            loop {
                match subscriber.recv().await {
                    Ok(event) => {
                        if !filter_state.read().await.matches(&event) {
                            continue;
                        }
                        let payload = serde_json::json!({ "type": "reset", "data": event });
                        if out_tx.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%connection_id, %skipped, "reset stream lagged; dropping events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(%connection_id, "reset broadcast channel closed");
                        break;
                    }
                }
            }
        }
    });

    let mut receive_task = tokio::spawn({
        let out_tx = out_tx.clone();
        let filter_state = Arc::clone(&filter_state);

        async move {
            while let Some(Ok(message)) = stream.next().await {
                match message {
                    Message::Ping(payload) => {
                        let _ = out_tx.send(Message::Pong(payload)).await;
                    }
                    Message::Text(text) => {
                        if let Ok(msg) = serde_json::from_str::<FilterMessage>(&text) {
                            if msg.r#type == "filter" {
                                *filter_state.write().await = msg.filter;
                            }
                        }
                    }
                    Message::Close(frame) => {
                        info!(%connection_id, ?frame, "reset stream client closed connection");
                        break;
                    }
                    Message::Pong(_) | Message::Binary(_) => {}
                }
            }
        }
    });

    tokio::select! {
        _ = &mut sink_task => {},
        _ = &mut broadcast_task => {},
        _ = &mut receive_task => {},
    }

    sink_task.abort();
    broadcast_task.abort();
    receive_task.abort();

    info!(%connection_id, "reset stream connection closed");
}
