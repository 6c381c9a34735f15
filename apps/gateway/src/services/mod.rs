// [apps/gateway/src/services/mod.rs]
pub mod command_dispatcher;
pub mod device_sweeper;
pub mod event_bus;
pub mod event_engine;
pub mod position_pipeline;
pub mod retention;
