// [libs/infra-db/src/repositories/geofence_repository.rs]
/*!
 * Persistencia de geofences. `list_active_geofences` alimenta la
 * reconstrucción del índice en memoria (core-geo) cada vez que una
 * mutación CUD incrementa `version`.
 */

use crate::client::DatabaseClient;
use crate::errors::DbError;
use libsql::params;
use sentinel_domain_models::Geofence;
use tracing::instrument;

pub struct GeofenceRepository {
    database_client: DatabaseClient,
}

impl GeofenceRepository {
    pub fn new(database_client: DatabaseClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self))]
    pub async fn list_active_geofences(&self) -> Result<Vec<Geofence>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT name, description, geometry_json, disabled, calendar_id, attributes_json, version
                 FROM geofences WHERE disabled = 0",
                (),
            )
            .await?;
        let mut geofences = Vec::new();
        while let Some(row) = rows.next().await? {
            geofences.push(map_row_to_geofence(&row)?);
        }
        Ok(geofences)
    }

    #[instrument(skip(self, geofence))]
    pub async fn upsert_geofence(&self, geofence: &Geofence) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let geometry_json = serde_json::to_string(&geofence.geometry).map_err(|e| DbError::MappingError(e.to_string()))?;
        let attributes_json = serde_json::to_string(&geofence.attributes).map_err(|e| DbError::MappingError(e.to_string()))?;

        connection
            .execute(
                "INSERT INTO geofences (name, description, geometry_json, disabled, calendar_id, attributes_json, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    geometry_json = excluded.geometry_json,
                    disabled = excluded.disabled,
                    calendar_id = excluded.calendar_id,
                    attributes_json = excluded.attributes_json,
                    version = geofences.version + 1",
                params![
                    geofence.name.clone(),
                    geofence.description.clone(),
                    geometry_json,
                    geofence.disabled as i64,
                    geofence.calendar_id.clone(),
                    attributes_json
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_geofence(&self, name: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let affected = connection.execute("DELETE FROM geofences WHERE name = ?1", params![name]).await?;
        if affected == 0 {
            return Err(DbError::GeofenceNotFound);
        }
        Ok(())
    }
}

fn map_row_to_geofence(row: &libsql::Row) -> Result<Geofence, DbError> {
    let geometry_json: String = row.get(2)?;
    let attributes_json: String = row.get(5)?;
    Ok(Geofence {
        name: row.get(0)?,
        description: row.get(1)?,
        geometry: serde_json::from_str(&geometry_json).map_err(|e| DbError::MappingError(e.to_string()))?,
        disabled: row.get::<i64>(3)? != 0,
        calendar_id: row.get(4)?,
        attributes: serde_json::from_str(&attributes_json).map_err(|e| DbError::MappingError(e.to_string()))?,
        version: row.get::<i64>(6)? as u64,
    })
}
