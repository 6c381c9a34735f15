// [libs/infra-db/src/lib.rs]
/*!
 * APARATO: PERSISTENCE FACADE (ESTRATO L3)
 * RESPONSABILIDAD: ÚNICO PUNTO DE ENTRADA HACIA EL MOTOR LIBSQL
 *
 * Nada por fuera de este crate conoce SQL. El núcleo (binario
 * `gateway`) habla con repositorios que devuelven tipos de
 * `sentinel_domain_models`, nunca filas.
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::DatabaseClient;
pub use errors::DbError;
pub use repositories::{
    CommandRepository, DeviceRepository, EventRepository, GeofenceRepository, PositionRepository,
};
