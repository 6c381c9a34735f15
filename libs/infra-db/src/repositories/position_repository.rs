// [libs/infra-db/src/repositories/position_repository.rs]
/*!
 * Persistencia de posiciones (§4.10): inserción idempotente por clave
 * lógica (R2) y consulta de historial reciente por dispositivo.
 */

use crate::client::DatabaseClient;
use crate::errors::DbError;
use chrono::{DateTime, Utc};
use libsql::params;
use sentinel_domain_models::{Owner, Position};
use tracing::{debug, instrument};

pub struct PositionRepository {
    database_client: DatabaseClient,
}

impl PositionRepository {
    pub fn new(database_client: DatabaseClient) -> Self {
        Self { database_client }
    }

    /// Inserta una posición si su clave lógica no existe todavía.
    /// Si ya existe (re-ingesta de la misma trama), devuelve el id
    /// existente sin duplicar la fila (R2).
    #[instrument(skip(self, position))]
    pub async fn insert_position(&self, position: &Position) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;

        let (owner_kind, owner_id) = match &position.owner {
            Owner::Device(id) => ("device", id.clone()),
            Owner::Unknown(id) => ("unknown", id.clone()),
        };
        let logical_key = position.logical_key(&owner_id);
        let attributes_json = serde_json::to_string(&position.attributes)
            .map_err(|e| DbError::MappingError(e.to_string()))?;

        let insert_sql = "
            INSERT INTO positions (
                owner_kind, owner_id, protocol, server_time, device_time, fix_time,
                valid, latitude, longitude, altitude, speed_knots, course, accuracy,
                attributes_json, logical_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(logical_key) DO NOTHING
        ";

        connection
            .execute(
                insert_sql,
                params![
                    owner_kind,
                    owner_id.clone(),
                    position.protocol.clone(),
                    position.server_time.to_rfc3339(),
                    position.device_time.to_rfc3339(),
                    position.fix_time.to_rfc3339(),
                    position.valid as i64,
                    position.latitude,
                    position.longitude,
                    position.altitude,
                    position.speed_knots,
                    position.course,
                    position.accuracy,
                    attributes_json,
                    logical_key.clone()
                ],
            )
            .await?;

        let mut rows = connection
            .query("SELECT id FROM positions WHERE logical_key = ?1", params![logical_key])
            .await?;
        let row = rows.next().await?.ok_or_else(|| DbError::MappingError("inserted row vanished".into()))?;
        let id: i64 = row.get(0)?;
        debug!("📍 [POSITION]: stored position {} for owner {}", id, owner_id);
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn recent_for_device(&self, device_id: &str, limit: i64) -> Result<Vec<Position>, DbError> {
        let connection = self.database_client.get_connection()?;
        let query = "
            SELECT id, owner_kind, owner_id, protocol, server_time, device_time, fix_time,
                   valid, latitude, longitude, altitude, speed_knots, course, accuracy, attributes_json
            FROM positions
            WHERE owner_kind = 'device' AND owner_id = ?1
            ORDER BY device_time DESC
            LIMIT ?2
        ";
        let mut rows = connection.query(query, params![device_id, limit]).await?;
        let mut positions = Vec::new();
        while let Some(row) = rows.next().await? {
            positions.push(map_row_to_position(&row)?);
        }
        Ok(positions)
    }

    /// Purga posiciones anteriores al umbral de retención. Devuelve el
    /// número de filas eliminadas para telemetría del job de compactación.
    #[instrument(skip(self))]
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection
            .execute("DELETE FROM positions WHERE device_time < ?1", params![cutoff.to_rfc3339()])
            .await?;
        Ok(affected)
    }
}

fn map_row_to_position(row: &libsql::Row) -> Result<Position, DbError> {
    let owner_kind: String = row.get(1)?;
    let owner_id: String = row.get(2)?;
    let owner = if owner_kind == "device" { Owner::Device(owner_id) } else { Owner::Unknown(owner_id) };

    let attributes_json: String = row.get(14)?;
    let attributes = serde_json::from_str(&attributes_json).map_err(|e| DbError::MappingError(e.to_string()))?;

    Ok(Position {
        id: Some(row.get(0)?),
        owner,
        protocol: row.get(3)?,
        server_time: parse_rfc3339(row.get::<String>(4)?)?,
        device_time: parse_rfc3339(row.get::<String>(5)?)?,
        fix_time: parse_rfc3339(row.get::<String>(6)?)?,
        valid: row.get::<i64>(7)? != 0,
        latitude: row.get(8)?,
        longitude: row.get(9)?,
        altitude: row.get(10)?,
        speed_knots: row.get(11)?,
        course: row.get(12)?,
        accuracy: row.get(13)?,
        attributes,
    })
}

fn parse_rfc3339(raw: String) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::MappingError(e.to_string()))
}
