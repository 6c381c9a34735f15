// [apps/gateway/src/routes.rs]
/*!
 * APARATO: ROUTING TOPOLOGY (ESTRATO L3)
 * RESPONSABILIDAD: SUPERFICIE HTTP/WS DEL GATEWAY
 *
 * Tres estratos conviven bajo el mismo router: ingestión OsmAnd
 * (pública, sin autenticación — la identidad del dispositivo se
 * resuelve en C3), el socket de suscripción del operador (público,
 * autenticado implícitamente por topic), y la API de administración
 * de comandos (protegida por `auth_guard`). El listener Suntech vive
 * fuera de axum por completo — es TCP crudo, ver `kernel.rs`.
 */

use crate::handlers::{admin, osmand_http, subscription_ws};
use crate::middleware::{auth_guard, health_guard};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{compression::CompressionLayer, cors::{Any, CorsLayer}, trace::TraceLayer};

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let admin_api = Router::new()
        .route("/commands", post(admin::enqueue_command))
        .route("/commands/:command_id/cancel", post(admin::cancel_command))
        .route("/commands/:command_id/retry", post(admin::retry_command))
        .route("/templates", post(admin::create_template))
        .route("/templates/:template_id/use", post(admin::use_template))
        .layer(middleware::from_fn(auth_guard));

    let guarded_routes = Router::new()
        .route("/api/v1/osmand", post(osmand_http::ingest_osmand_report).get(osmand_http::ingest_osmand_report))
        .route("/api/v1/stream", get(subscription_ws::establish_subscription_socket))
        .nest("/api/v1/admin", admin_api)
        .layer(middleware::from_fn_with_state(state.clone(), health_guard));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(guarded_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}
