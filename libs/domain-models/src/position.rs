// [libs/domain-models/src/position.rs]
/*!
 * APARATO: POSITION CONTRACT (ESTRATO L2)
 * Muestra canónica de telemetría. Inmutable tras la escritura.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Referencia exclusiva al propietario de una posición: o bien un
/// dispositivo registrado, o bien un registro de cuarentena.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Owner {
    Device(String),
    Unknown(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Option<i64>,
    pub owner: Owner,
    pub protocol: String,
    pub server_time: DateTime<Utc>,
    pub device_time: DateTime<Utc>,
    pub fix_time: DateTime<Utc>,
    pub valid: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Velocidad en nudos (knots), siempre normalizada en esta unidad.
    pub speed_knots: f64,
    pub course: f64,
    pub accuracy: f64,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Position {
    /// P2: invariante de coordenadas válidas, excluyendo el origen nulo (B2).
    pub fn has_valid_fix(&self) -> bool {
        self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_knots / 0.539_957
    }

    pub fn ignition(&self) -> Option<bool> {
        self.attributes.get("ignition").and_then(|v| v.as_bool())
    }

    pub fn alarm(&self) -> Option<String> {
        self.attributes
            .get("alarm")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// Clave lógica de deduplicación usada por la fachada de persistencia
    /// para garantizar idempotencia de re-ingestas (R2).
    pub fn logical_key(&self, owner_id: &str) -> String {
        format!(
            "{}|{}|{:.6}|{:.6}",
            owner_id,
            self.device_time.timestamp_millis(),
            self.latitude,
            self.longitude
        )
    }
}
