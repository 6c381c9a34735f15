// [libs/infra-db/src/repositories/event_repository.rs]
/*!
 * Persistencia de eventos (§4.10). El dedup de eventos de geofence
 * (P3) se resuelve en el motor de eventos antes de llamar aquí; este
 * repositorio solo escribe y consulta.
 */

use crate::client::DatabaseClient;
use crate::errors::DbError;
use chrono::{DateTime, Utc};
use libsql::params;
use sentinel_domain_models::{Event, EventType};
use tracing::instrument;

pub struct EventRepository {
    database_client: DatabaseClient,
}

impl EventRepository {
    pub fn new(database_client: DatabaseClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, event))]
    pub async fn insert_event(&self, event: &Event) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let attributes_json = serde_json::to_string(&event.attributes).map_err(|e| DbError::MappingError(e.to_string()))?;

        connection
            .execute(
                "INSERT INTO events (event_type, event_time, device_id, position_id, geofence_id, maintenance_id, attributes_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event_type_label(event.event_type),
                    event.event_time.to_rfc3339(),
                    event.device_id.clone(),
                    event.position_id,
                    event.geofence_id.clone(),
                    event.maintenance_id.clone(),
                    attributes_json
                ],
            )
            .await?;

        let mut rows = connection.query("SELECT last_insert_rowid()", ()).await?;
        let row = rows.next().await?.ok_or_else(|| DbError::MappingError("insert id missing".into()))?;
        Ok(row.get(0)?)
    }

    /// Devuelve true si ya existe un evento de geofence para esta
    /// combinación (device, geofence, type) dentro de la ventana dada,
    /// usada por el motor de eventos para implementar P3.
    #[instrument(skip(self))]
    pub async fn geofence_event_exists_since(
        &self,
        device_id: &str,
        geofence_id: &str,
        event_type: EventType,
        since: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT 1 FROM events WHERE device_id = ?1 AND geofence_id = ?2 AND event_type = ?3 AND event_time >= ?4 LIMIT 1",
                params![device_id, geofence_id, event_type_label(event_type), since.to_rfc3339()],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    #[instrument(skip(self))]
    pub async fn recent_for_device(&self, device_id: &str, limit: i64) -> Result<Vec<Event>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, event_type, event_time, device_id, position_id, geofence_id, maintenance_id, attributes_json
                 FROM events WHERE device_id = ?1 ORDER BY event_time DESC LIMIT ?2",
                params![device_id, limit],
            )
            .await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(map_row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Purga eventos anteriores al umbral de retención.
    #[instrument(skip(self))]
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute("DELETE FROM events WHERE event_time < ?1", params![cutoff.to_rfc3339()])
            .await?;
        Ok(affected)
    }
}

fn event_type_label(event_type: EventType) -> &'static str {
    match event_type {
        EventType::DeviceOnline => "deviceOnline",
        EventType::DeviceOffline => "deviceOffline",
        EventType::DeviceUnknown => "deviceUnknown",
        EventType::DeviceInactive => "deviceInactive",
        EventType::DeviceMoving => "deviceMoving",
        EventType::DeviceStopped => "deviceStopped",
        EventType::DeviceOverspeed => "deviceOverspeed",
        EventType::DeviceFuelDrop => "deviceFuelDrop",
        EventType::DeviceFuelIncrease => "deviceFuelIncrease",
        EventType::GeofenceEnter => "geofenceEnter",
        EventType::GeofenceExit => "geofenceExit",
        EventType::Alarm => "alarm",
        EventType::IgnitionOn => "ignitionOn",
        EventType::IgnitionOff => "ignitionOff",
        EventType::Maintenance => "maintenance",
        EventType::DriverChanged => "driverChanged",
        EventType::Media => "media",
        EventType::CommandResult => "commandResult",
        EventType::QueuedCommandSent => "queuedCommandSent",
    }
}

fn event_type_from_label(label: &str) -> Result<EventType, DbError> {
    Ok(match label {
        "deviceOnline" => EventType::DeviceOnline,
        "deviceOffline" => EventType::DeviceOffline,
        "deviceUnknown" => EventType::DeviceUnknown,
        "deviceInactive" => EventType::DeviceInactive,
        "deviceMoving" => EventType::DeviceMoving,
        "deviceStopped" => EventType::DeviceStopped,
        "deviceOverspeed" => EventType::DeviceOverspeed,
        "deviceFuelDrop" => EventType::DeviceFuelDrop,
        "deviceFuelIncrease" => EventType::DeviceFuelIncrease,
        "geofenceEnter" => EventType::GeofenceEnter,
        "geofenceExit" => EventType::GeofenceExit,
        "alarm" => EventType::Alarm,
        "ignitionOn" => EventType::IgnitionOn,
        "ignitionOff" => EventType::IgnitionOff,
        "maintenance" => EventType::Maintenance,
        "driverChanged" => EventType::DriverChanged,
        "media" => EventType::Media,
        "commandResult" => EventType::CommandResult,
        "queuedCommandSent" => EventType::QueuedCommandSent,
        other => return Err(DbError::MappingError(format!("unknown event_type '{other}'"))),
    })
}

fn map_row_to_event(row: &libsql::Row) -> Result<Event, DbError> {
    let event_type_label: String = row.get(1)?;
    let attributes_json: String = row.get(7)?;
    Ok(Event {
        id: Some(row.get(0)?),
        event_type: event_type_from_label(&event_type_label)?,
        event_time: DateTime::parse_from_rfc3339(&row.get::<String>(2)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        device_id: row.get(3)?,
        position_id: row.get(4)?,
        geofence_id: row.get(5)?,
        maintenance_id: row.get(6)?,
        attributes: serde_json::from_str(&attributes_json).map_err(|e| DbError::MappingError(e.to_string()))?,
    })
}
