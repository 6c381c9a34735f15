// [apps/gateway/src/handlers/subscription_ws.rs]
/*!
 * APARATO: OPERATOR SUBSCRIPTION SOCKET (ESTRATO L4)
 * RESPONSABILIDAD: HUB DE TIEMPO REAL PARA EL CLIENTE OPERADOR (§4.9)
 *
 * Arquitectura de Triple Tarea (downstream, upstream, worker interno),
 * igual que cualquier otro socket de mando del sistema: el primer
 * centinela que termina dispara el aborto de los otros dos. El
 * filtrado por topic ocurre en la tarea downstream, contra el
 * conjunto de suscripciones que la tarea interna mantiene actualizado.
 */

use crate::services::event_bus::FleetSignal;
use crate::state::AppState;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::IntoResponse,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use sentinel_domain_models::{ClientMessage, ServerMessage, Topic};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const KEEPALIVE_INTERVAL_SECONDS: u64 = 25;
const CLIENT_MESSAGE_BUFFER_CAPACITY: usize = 32;

#[instrument(skip(websocket_upgrade, state))]
pub async fn establish_subscription_socket(websocket_upgrade: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    websocket_upgrade.on_upgrade(move |socket| handle_subscription_session(socket, state))
}

async fn handle_subscription_session(socket: WebSocket, state: AppState) {
    let (mut socket_sender, mut socket_receiver) = socket.split();
    let mut event_bus_subscriber = state.event_bus.subscribe();

    let session_id = Uuid::new_v4().to_string();
    info!("⚡ [SUBSCRIPTION]: session {} established", session_id);

    let subscribed_topics: Arc<RwLock<HashSet<Topic>>> = Arc::new(RwLock::new(HashSet::new()));

    let (client_message_sender, mut client_message_receiver) = mpsc::channel::<ClientMessage>(CLIENT_MESSAGE_BUFFER_CAPACITY);

    let worker_topics = subscribed_topics.clone();
    let mut worker_task = tokio::spawn(async move {
        while let Some(message) = client_message_receiver.recv().await {
            match message {
                ClientMessage::Subscribe { topic } => {
                    worker_topics.write().expect("subscription set lock poisoned").insert(Topic(topic));
                }
                ClientMessage::Unsubscribe { topic } => {
                    worker_topics.write().expect("subscription set lock poisoned").remove(&Topic(topic));
                }
                ClientMessage::Heartbeat => {}
            }
        }
    });

    let downstream_topics = subscribed_topics.clone();
    let session_id_downstream = session_id.clone();
    let mut sender_task = tokio::spawn(async move {
        let mut keepalive_timer = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));

        loop {
            tokio::select! {
                _ = keepalive_timer.tick() => {
                    let heartbeat = ServerMessage::Heartbeat { timestamp: Utc::now() };
                    if send_server_message(&mut socket_sender, &heartbeat).await.is_err() {
                        break;
                    }
                }

                signal = event_bus_subscriber.recv() => {
                    match signal {
                        Ok(FleetSignal { topic, message }) => {
                            let subscribed = downstream_topics.read().expect("subscription set lock poisoned").contains(&topic);
                            if subscribed && send_server_message(&mut socket_sender, &message).await.is_err() {
                                warn!("⚠️ [SUBSCRIPTION]: session {} lost downstream link", session_id_downstream);
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            // Desbordamiento del buffer acotado por sesión (§4.9): se
                            // descarta la sesión en lugar de frenar al resto del bus.
                            warn!("🐢 [SUBSCRIPTION]: session {} overflowed ({} frames missed), dropping session", session_id_downstream, missed);
                            break;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            warn!("💀 [SUBSCRIPTION]: event bus closed for session {}", session_id_downstream);
                            break;
                        }
                    }
                }
            }
        }
    });

    let session_id_upstream = session_id.clone();
    let mut receiver_task = tokio::spawn(async move {
        while let Some(frame) = socket_receiver.next().await {
            match frame {
                Ok(Message::Text(raw)) => match serde_json::from_str::<ClientMessage>(&raw) {
                    Ok(client_message) => {
                        if client_message_sender.send(client_message).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        debug!("⚠️ [SUBSCRIPTION]: malformed client message from {}: {}", session_id_upstream, error);
                    }
                },
                Ok(Message::Close(_)) => break,
                Err(error) => {
                    warn!("⚠️ [SUBSCRIPTION]: upstream error for {}: {}", session_id_upstream, error);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut sender_task) => {
            receiver_task.abort();
            worker_task.abort();
        }
        _ = (&mut receiver_task) => {
            sender_task.abort();
            worker_task.abort();
        }
        _ = (&mut worker_task) => {
            sender_task.abort();
            receiver_task.abort();
        }
    }

    info!("💀 [SUBSCRIPTION]: session {} terminated", session_id);
}

async fn send_server_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message).unwrap_or_default();
    sender.send(Message::Text(payload)).await
}
