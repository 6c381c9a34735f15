// [apps/gateway/src/services/event_bus.rs]
/*!
 * APARATO: SUBSCRIPTION EVENT BUS (ESTRATO L4)
 * RESPONSABILIDAD: DIFUSIÓN DE SEÑALES EN TIEMPO REAL (§4.9)
 *
 * Un único canal de difusión central (`broadcast`); cada sesión
 * WebSocket filtra localmente contra su propio conjunto de topics
 * suscritos. El buffer de cada suscriptor actúa como el buffer
 * acotado por sesión (§4.9): un suscriptor que no drena a tiempo se
 * desfasa (`Lagged`) y la sesión se descarta, sin frenar al resto del
 * bus (P8).
 */

use chrono::Utc;
use sentinel_domain_models::{ServerMessage, Topic};
use tokio::sync::broadcast;
use tracing::{instrument, warn};

const CHANNEL_CAPACITY: usize = 4096;

/// Señal difundida por el bus: el topic de origen más el mensaje de
/// cable ya serializable a JSON para el cliente operador.
#[derive(Debug, Clone)]
pub struct FleetSignal {
    pub topic: Topic,
    pub message: ServerMessage,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FleetSignal>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetSignal> {
        self.sender.subscribe()
    }

    #[instrument(skip(self, data))]
    pub fn publish_position(&self, device_id: &str, data: serde_json::Value) {
        self.dispatch(Topic::device(device_id), ServerMessage::Position { data: data.clone(), timestamp: Utc::now() });
        self.dispatch(Topic::positions(), ServerMessage::Position { data, timestamp: Utc::now() });
    }

    #[instrument(skip(self, data))]
    pub fn publish_event(&self, device_id: &str, data: serde_json::Value) {
        self.dispatch(Topic::device(device_id), ServerMessage::Event { data: data.clone(), timestamp: Utc::now() });
        self.dispatch(Topic::events(), ServerMessage::Event { data, timestamp: Utc::now() });
    }

    #[instrument(skip(self, data))]
    pub fn publish_device_status(&self, device_id: &str, data: serde_json::Value, old_status: &str) {
        self.dispatch(
            Topic::device(device_id),
            ServerMessage::DeviceStatus { data: data.clone(), old_status: old_status.to_string(), timestamp: Utc::now() },
        );
        self.dispatch(Topic::devices(), ServerMessage::DeviceStatus { data, old_status: old_status.to_string(), timestamp: Utc::now() });
    }

    #[instrument(skip(self, data))]
    pub fn publish_unknown_device(&self, data: serde_json::Value) {
        self.dispatch(Topic::unknown_devices(), ServerMessage::UnknownDevice { data, timestamp: Utc::now() });
    }

    fn dispatch(&self, topic: Topic, message: ServerMessage) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(err) = self.sender.send(FleetSignal { topic, message }) {
            warn!("⚠️ [EVENT_BUS]: dispatch failed with no subscribers remaining: {}", err);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
