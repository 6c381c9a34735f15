// [libs/domain-models/src/event.rs]
/*!
 * APARATO: EVENT CONTRACT (ESTRATO L2)
 * Ocurrencia derivada ligada a un dispositivo y, opcionalmente, a una
 * posición y/o geofence. Inmutable tras la escritura.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Conjunto cerrado de tipos de evento (ver GLOSSARY del diseño original).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    DeviceOnline,
    DeviceOffline,
    DeviceUnknown,
    DeviceInactive,
    DeviceMoving,
    DeviceStopped,
    DeviceOverspeed,
    DeviceFuelDrop,
    DeviceFuelIncrease,
    GeofenceEnter,
    GeofenceExit,
    Alarm,
    IgnitionOn,
    IgnitionOff,
    Maintenance,
    DriverChanged,
    Media,
    CommandResult,
    QueuedCommandSent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub event_type: EventType,
    pub event_time: DateTime<Utc>,
    pub device_id: String,
    pub position_id: Option<i64>,
    pub geofence_id: Option<String>,
    pub maintenance_id: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Event {
    pub fn new(event_type: EventType, device_id: impl Into<String>) -> Self {
        Self {
            id: None,
            event_type,
            event_time: Utc::now(),
            device_id: device_id.into(),
            position_id: None,
            geofence_id: None,
            maintenance_id: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_position(mut self, position_id: Option<i64>) -> Self {
        self.position_id = position_id;
        self
    }

    pub fn with_geofence(mut self, geofence_id: impl Into<String>) -> Self {
        self.geofence_id = Some(geofence_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Clave de deduplicación para eventos de geofence (P3): por
    /// (device, geofence, type) dentro de una ventana de 5 minutos.
    pub fn geofence_dedup_key(&self) -> Option<(String, String, EventType)> {
        self.geofence_id
            .as_ref()
            .map(|gid| (self.device_id.clone(), gid.clone(), self.event_type))
    }
}
