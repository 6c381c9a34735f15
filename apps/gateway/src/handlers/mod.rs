// [apps/gateway/src/handlers/mod.rs]
pub mod admin;
pub mod osmand_http;
pub mod subscription_ws;
pub mod suntech_listener;
