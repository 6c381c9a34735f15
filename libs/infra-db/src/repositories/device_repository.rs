// [libs/infra-db/src/repositories/device_repository.rs]
/*!
 * Persistencia de dispositivos y del estrato de cuarentena
 * (UnknownDevice). `update_device_summary` es la única escritura que
 * el pipeline de posiciones (C4) hace sobre `devices` por trama: un
 * UPDATE transaccional de los campos derivados.
 */

use crate::client::DatabaseClient;
use crate::errors::DbError;
use chrono::{DateTime, Utc};
use libsql::params;
use sentinel_domain_models::{Device, DeviceStatus, MotionState, UnknownDevice};
use tracing::instrument;

pub struct DeviceRepository {
    database_client: DatabaseClient,
}

impl DeviceRepository {
    pub fn new(database_client: DatabaseClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self))]
    pub async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT unique_id, name, protocol, status, last_seen, last_position_id, total_distance_meters,
                        motion_state, ignition_on, overspeed, speed_limit_kmh, expires_at, group_id, owner_id, attributes_json
                 FROM devices WHERE unique_id = ?1",
                params![unique_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_device(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT unique_id, name, protocol, status, last_seen, last_position_id, total_distance_meters,
                        motion_state, ignition_on, overspeed, speed_limit_kmh, expires_at, group_id, owner_id, attributes_json
                 FROM devices",
                (),
            )
            .await?;
        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(map_row_to_device(&row)?);
        }
        Ok(devices)
    }

    #[instrument(skip(self, device))]
    pub async fn upsert_device(&self, device: &Device) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let attributes_json = serde_json::to_string(&device.attributes).map_err(|e| DbError::MappingError(e.to_string()))?;
        connection
            .execute(
                "INSERT INTO devices (
                    unique_id, name, protocol, status, last_seen, last_position_id, total_distance_meters,
                    motion_state, ignition_on, overspeed, speed_limit_kmh, expires_at, group_id, owner_id, attributes_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                 ON CONFLICT(unique_id) DO UPDATE SET
                    name = excluded.name,
                    protocol = excluded.protocol,
                    status = excluded.status,
                    speed_limit_kmh = excluded.speed_limit_kmh,
                    group_id = excluded.group_id,
                    owner_id = excluded.owner_id,
                    attributes_json = excluded.attributes_json",
                params![
                    device.unique_id.clone(),
                    device.name.clone(),
                    device.protocol.clone(),
                    device_status_label(device.status),
                    device.last_seen.map(|t| t.to_rfc3339()),
                    device.last_position_id,
                    device.total_distance_meters,
                    motion_state_label(device.motion_state),
                    device.ignition_on as i64,
                    device.overspeed as i64,
                    device.speed_limit_kmh,
                    device.expires_at.map(|t| t.to_rfc3339()),
                    device.group_id.clone(),
                    device.owner_id.clone(),
                    attributes_json
                ],
            )
            .await?;
        Ok(())
    }

    /// Escritura transaccional de los campos derivados por cada trama
    /// procesada exitosamente: última posición, estado de movimiento,
    /// distancia acumulada, encendido y velocidad excedida.
    #[instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn update_device_summary(
        &self,
        unique_id: &str,
        status: DeviceStatus,
        last_seen: DateTime<Utc>,
        last_position_id: i64,
        total_distance_meters: f64,
        motion_state: MotionState,
        ignition_on: bool,
        overspeed: bool,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await?;
        let affected = transaction
            .execute(
                "UPDATE devices SET status = ?2, last_seen = ?3, last_position_id = ?4, total_distance_meters = ?5,
                        motion_state = ?6, ignition_on = ?7, overspeed = ?8
                 WHERE unique_id = ?1",
                params![
                    unique_id,
                    device_status_label(status),
                    last_seen.to_rfc3339(),
                    last_position_id,
                    total_distance_meters,
                    motion_state_label(motion_state),
                    ignition_on as i64,
                    overspeed as i64
                ],
            )
            .await?;
        if affected == 0 {
            transaction.rollback().await?;
            return Err(DbError::DeviceNotFound);
        }
        transaction.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn find_unknown(&self, unique_id: &str, protocol: &str) -> Result<Option<UnknownDevice>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT unique_id, protocol, listener_port, first_seen, last_seen, connection_count,
                        last_raw_frame, last_parsed_payload_json, registered, adopted_device_id
                 FROM unknown_devices WHERE unique_id = ?1 AND protocol = ?2",
                params![unique_id, protocol],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(map_row_to_unknown_device(&row)?)),
            None => Ok(None),
        }
    }

    /// Upsert de un registro de cuarentena: primer contacto crea la
    /// fila, contactos subsiguientes incrementan el contador y
    /// refrescan la última trama cruda.
    #[instrument(skip(self, raw_frame, parsed_payload))]
    pub async fn touch_unknown_device(
        &self,
        unique_id: &str,
        protocol: &str,
        listener_port: u16,
        raw_frame: Option<&str>,
        parsed_payload: Option<&serde_json::Value>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now().to_rfc3339();
        let parsed_payload_json = parsed_payload
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DbError::MappingError(e.to_string()))?;

        connection
            .execute(
                "INSERT INTO unknown_devices (unique_id, protocol, listener_port, first_seen, last_seen, connection_count, last_raw_frame, last_parsed_payload_json)
                 VALUES (?1, ?2, ?3, ?4, ?4, 1, ?5, ?6)
                 ON CONFLICT(unique_id, protocol) DO UPDATE SET
                    last_seen = ?4,
                    connection_count = connection_count + 1,
                    last_raw_frame = ?5,
                    last_parsed_payload_json = ?6",
                params![unique_id, protocol, listener_port, now, raw_frame, parsed_payload_json],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_unknown_registered(&self, unique_id: &str, protocol: &str, adopted_device_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE unknown_devices SET registered = 1, adopted_device_id = ?3 WHERE unique_id = ?1 AND protocol = ?2",
                params![unique_id, protocol, adopted_device_id],
            )
            .await?;
        Ok(())
    }
}

fn device_status_label(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Online => "online",
        DeviceStatus::Offline => "offline",
        DeviceStatus::Unknown => "unknown",
    }
}

fn device_status_from_label(label: &str) -> DeviceStatus {
    match label {
        "online" => DeviceStatus::Online,
        "unknown" => DeviceStatus::Unknown,
        _ => DeviceStatus::Offline,
    }
}

fn motion_state_label(state: MotionState) -> &'static str {
    match state {
        MotionState::Stopped => "stopped",
        MotionState::Moving => "moving",
    }
}

fn motion_state_from_label(label: &str) -> MotionState {
    match label {
        "moving" => MotionState::Moving,
        _ => MotionState::Stopped,
    }
}

fn map_row_to_device(row: &libsql::Row) -> Result<Device, DbError> {
    let attributes_json: String = row.get(14)?;
    Ok(Device {
        unique_id: row.get(0)?,
        name: row.get(1)?,
        protocol: row.get(2)?,
        status: device_status_from_label(&row.get::<String>(3)?),
        last_seen: row
            .get::<Option<String>>(4)?
            .map(|raw| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        last_position_id: row.get(5)?,
        total_distance_meters: row.get(6)?,
        motion_state: motion_state_from_label(&row.get::<String>(7)?),
        ignition_on: row.get::<i64>(8)? != 0,
        overspeed: row.get::<i64>(9)? != 0,
        speed_limit_kmh: row.get(10)?,
        expires_at: row
            .get::<Option<String>>(11)?
            .map(|raw| DateTime::parse_from_rfc3339(&raw).map(|dt| dt.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        group_id: row.get(12)?,
        owner_id: row.get(13)?,
        attributes: serde_json::from_str(&attributes_json).map_err(|e| DbError::MappingError(e.to_string()))?,
    })
}

fn map_row_to_unknown_device(row: &libsql::Row) -> Result<UnknownDevice, DbError> {
    let parsed_payload_json: Option<String> = row.get(7)?;
    Ok(UnknownDevice {
        unique_id: row.get(0)?,
        protocol: row.get(1)?,
        listener_port: row.get::<i64>(2)? as u16,
        first_seen: DateTime::parse_from_rfc3339(&row.get::<String>(3)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        last_seen: DateTime::parse_from_rfc3339(&row.get::<String>(4)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        connection_count: row.get::<i64>(5)? as u64,
        last_raw_frame: row.get(6)?,
        last_parsed_payload: parsed_payload_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        registered: row.get::<i64>(8)? != 0,
        adopted_device_id: row.get(9)?,
    })
}
