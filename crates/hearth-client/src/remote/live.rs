use crate::error::{ClientError, Result};
use futures_util::{SinkExt, StreamExt};
use hearth_protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::state::AppState;

const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Live subscription to room message collections.
///
/// Incoming snapshots and changes are applied to [`AppState`]; the view
/// merge reads them from there.
pub struct LiveFeed {
    sender: mpsc::Sender<ClientMessage>,
    reader: JoinHandle<()>,
    pinger: JoinHandle<()>,
}

impl LiveFeed {
    pub async fn connect(url: &str, token: Option<&str>, state: AppState) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await?;

        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<ClientMessage>(64);

        if let Some(token) = token {
            let hello = ClientMessage::Authenticate {
                token: token.to_string(),
            };
            let json = serde_json::to_string(&hello)?;
            write.send(Message::Text(json.into())).await?;

            match read.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text)? {
                    ServerMessage::Authenticated => {
                        tracing::info!("Live feed authenticated");
                    }
                    ServerMessage::Error { message } => {
                        return Err(ClientError::Remote {
                            status: 401,
                            body: format!("Authentication failed: {}", message),
                        });
                    }
                    other => {
                        return Err(ClientError::Remote {
                            status: 500,
                            body: format!("Unexpected response during authentication: {:?}", other),
                        });
                    }
                },
                _ => {
                    return Err(ClientError::Remote {
                        status: 500,
                        body: "Connection closed during authentication".to_string(),
                    });
                }
            }
        }

        // Outgoing messages
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                if write.send(Message::Text(json.into())).await.is_err() {
                    tracing::error!("Failed to send live feed message");
                    break;
                }
            }
        });

        // Incoming messages
        let state_clone = state.clone();
        let reader = tokio::spawn(async move {
            let mut error = None;
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => Self::handle_message(&state_clone, msg).await,
                        Err(e) => tracing::warn!("Ignoring malformed live feed message: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("Live feed closed by server");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Live feed error: {}", e);
                        error = Some(e.to_string());
                        break;
                    }
                    _ => {}
                }
            }

            state_clone.set_connected(false, error).await;
        });

        state.set_connected(true, None).await;

        let tx_ping = tx.clone();
        let pinger = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PING_INTERVAL);
            loop {
                ticker.tick().await;
                if tx_ping.send(ClientMessage::Ping).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            sender: tx,
            reader,
            pinger,
        })
    }

    async fn handle_message(state: &AppState, message: ServerMessage) {
        match message {
            ServerMessage::Snapshot { room_id, messages } => {
                tracing::debug!("Snapshot of {} with {} messages", room_id, messages.len());
                state.set_room_messages(&room_id, messages).await;
            }
            ServerMessage::MessageCreated { message } | ServerMessage::MessageUpdated { message } => {
                state.upsert_message(message).await;
            }
            ServerMessage::MessageDeleted { room_id, message_id } => {
                state.remove_message(&room_id, &message_id).await;
            }
            ServerMessage::Error { message } => {
                tracing::error!("Live feed error from server: {}", message);
                state.write().await.connection_error = Some(message);
            }
            ServerMessage::Authenticated | ServerMessage::Pong => {}
        }
    }

    pub async fn subscribe_room(&self, room_id: &str) {
        let _ = self
            .sender
            .send(ClientMessage::Subscribe {
                room_id: room_id.to_string(),
            })
            .await;
    }

    pub async fn unsubscribe_room(&self, room_id: &str) {
        let _ = self
            .sender
            .send(ClientMessage::Unsubscribe {
                room_id: room_id.to_string(),
            })
            .await;
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.pinger.abort();
        self.reader.abort();
    }
}
