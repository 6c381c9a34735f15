// [libs/infra-db/src/errors.rs]
/*!
 * Catálogo de errores de la capa de persistencia (§4.10 Persistence
 * Facade). Todo fallo de escritura se traduce a una de estas variantes
 * antes de cruzar al resto del sistema — nadie aguas arriba ve un
 * `libsql::Error` crudo.
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("[DB_NET_FAULT]: database uplink severed -> {0}")]
    ConnectionError(String),

    #[error("[DB_CONFIG_FAULT]: database configuration invalid -> {0}")]
    ConfigurationError(String),

    #[error("[DB_QUERY_FAULT]: query rejected -> {0}")]
    QueryError(#[from] libsql::Error),

    #[error("[DB_MAPPING_FAULT]: row mapping violation -> {0}")]
    MappingError(String),

    #[error("[COMMAND_FAULT]: command not found")]
    CommandNotFound,

    #[error("[COMMAND_FAULT]: command is not in a state that permits this transition")]
    InvalidCommandTransition,

    #[error("[DEVICE_FAULT]: device not found")]
    DeviceNotFound,

    #[error("[GEOFENCE_FAULT]: geofence not found")]
    GeofenceNotFound,
}
