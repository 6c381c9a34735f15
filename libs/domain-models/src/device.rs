// [libs/domain-models/src/device.rs]
/*!
 * APARATO: DEVICE & UNKNOWN DEVICE CONTRACTS (ESTRATO L2)
 * Representa un rastreador registrado en la flota y el estrato de
 * cuarentena para tramas de dispositivos aún no adoptados.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Estado de presencia observado de un dispositivo registrado.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

/// Estado de movimiento derivado por el motor de eventos.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    #[default]
    Stopped,
    Moving,
}

/// Rastreador registrado en la flota. Mutado por el pipeline (status,
/// last position) y por el plano administrativo; nunca destruido por
/// el núcleo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Identificador único globalmente (opaco, estable).
    pub unique_id: String,
    pub name: String,
    pub protocol: String,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_position_id: Option<i64>,
    pub total_distance_meters: f64,
    pub motion_state: MotionState,
    pub ignition_on: bool,
    pub overspeed: bool,
    /// km/h; cero-valorado significa "usa el valor por defecto" (80 km/h).
    pub speed_limit_kmh: f64,
    pub expires_at: Option<DateTime<Utc>>,
    pub group_id: Option<String>,
    pub owner_id: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Device {
    pub fn effective_speed_limit_kmh(&self) -> f64 {
        if self.speed_limit_kmh > 0.0 {
            self.speed_limit_kmh
        } else {
            80.0
        }
    }
}

/// Placeholder de cuarentena para telemetría de un `unique_id` no
/// registrado. Exactamente un registro por (unique_id, protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownDevice {
    pub unique_id: String,
    pub protocol: String,
    pub listener_port: u16,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub connection_count: u64,
    pub last_raw_frame: Option<String>,
    pub last_parsed_payload: Option<serde_json::Value>,
    pub registered: bool,
    pub adopted_device_id: Option<String>,
}

impl UnknownDevice {
    pub fn first_contact(unique_id: String, protocol: String, listener_port: u16) -> Self {
        let now = Utc::now();
        Self {
            unique_id,
            protocol,
            listener_port,
            first_seen: now,
            last_seen: now,
            connection_count: 1,
            last_raw_frame: None,
            last_parsed_payload: None,
            registered: false,
            adopted_device_id: None,
        }
    }
}
