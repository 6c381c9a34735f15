// [libs/infra-db/src/repositories/mod.rs]
pub mod command_repository;
pub mod device_repository;
pub mod event_repository;
pub mod geofence_repository;
pub mod position_repository;

pub use command_repository::CommandRepository;
pub use device_repository::DeviceRepository;
pub use event_repository::EventRepository;
pub use geofence_repository::GeofenceRepository;
pub use position_repository::PositionRepository;
