// [libs/domain-models/src/subscription.rs]
/*!
 * APARATO: SUBSCRIPTION HUB WIRE CONTRACTS (ESTRATO L2)
 * Envelopes JSON para el canal bidireccional del operador (§6).
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clave de topic string. Per-device (`device:<id>`) o agregado
/// (`positions`, `events`, `devices`, `unknown_devices`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    pub fn device(id: &str) -> Self {
        Topic(format!("device:{id}"))
    }
    pub fn positions() -> Self {
        Topic("positions".to_string())
    }
    pub fn events() -> Self {
        Topic("events".to_string())
    }
    pub fn devices() -> Self {
        Topic("devices".to_string())
    }
    pub fn unknown_devices() -> Self {
        Topic("unknown_devices".to_string())
    }

    /// Determina si este topic cubre el topic per-device dado, ya sea
    /// por coincidencia exacta o por ser un agregado que lo abarca (P8).
    pub fn covers(&self, device_topic: &Topic, aggregate: &Topic) -> bool {
        self == device_topic || self == aggregate
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { #[serde(rename = "type")] topic: String },
    Unsubscribe { #[serde(rename = "type")] topic: String },
    Heartbeat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Position { data: serde_json::Value, timestamp: DateTime<Utc> },
    Event { data: serde_json::Value, timestamp: DateTime<Utc> },
    DeviceStatus { data: serde_json::Value, old_status: String, timestamp: DateTime<Utc> },
    UnknownDevice { data: serde_json::Value, timestamp: DateTime<Utc> },
    Info { data: String, timestamp: DateTime<Utc> },
    Error { data: String, timestamp: DateTime<Utc> },
    Heartbeat { timestamp: DateTime<Utc> },
}
