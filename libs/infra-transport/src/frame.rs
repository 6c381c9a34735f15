// [libs/infra-transport/src/frame.rs]
/*!
 * Trama canónica producida por cualquier decodificador. Unidades ya
 * normalizadas a metros, nudos y grados; tiempos ya normalizados a UTC.
 */

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Trama con fix GPS utilizable.
    Position,
    /// Trama sin coordenadas (p.ej. heartbeat OsmAnd sin lat/lon).
    Heartbeat,
}

#[derive(Debug, Clone)]
pub struct CanonicalFrame {
    pub source_id: String,
    pub protocol: &'static str,
    pub kind: FrameKind,
    pub device_time: DateTime<Utc>,
    pub client_address: Option<SocketAddr>,
    pub fields: HashMap<String, Value>,
    pub raw: Vec<u8>,
}

impl CanonicalFrame {
    pub fn field_f64(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    pub fn field_bool(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}
