// [libs/domain-models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODEL ROOT (ESTRATO L2)
 * RESPONSABILIDAD: DEFINICIÓN CANÓNICA DE LAS ENTIDADES DE LA FLOTA
 *
 * Single source of truth para los contratos de datos que cruzan la
 * frontera entre ingestión, pipeline de posiciones, motor de eventos,
 * despacho de comandos y el hub de suscripción en tiempo real.
 * =================================================================
 */

pub mod device;
pub mod position;
pub mod event;
pub mod geofence;
pub mod command;
pub mod subscription;

pub use device::{Device, DeviceStatus, MotionState, UnknownDevice};
pub use position::Position;
pub use event::{Event, EventType};
pub use geofence::{Geofence, GeofenceGeometry};
pub use command::{Command, CommandPriority, CommandStatus, CommandQueueEntry, CommandTemplate};
pub use subscription::{ClientMessage, ServerMessage, Topic};
