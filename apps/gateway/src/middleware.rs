// [apps/gateway/src/middleware.rs]
/*!
 * APARATO: PERIMETER GUARDS (ESTRATO L4)
 * RESPONSABILIDAD: SALUD Y AUTENTICACIÓN DEL PLANO ADMINISTRATIVO
 *
 * Los listeners de protocolo (Suntech TCP, OsmAnd HTTP) no pasan por
 * aquí — su superficie de autenticación es el propio `source_id` del
 * dispositivo, verificado en C3. `auth_guard` protege únicamente la
 * API de administración de comandos frente al operador.
 */

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

/// Bloquea el acceso mientras el sistema está en modo mantenimiento
/// (bootstrap en curso o certificación de integridad fallida).
pub async fn health_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Err(reason) = state.is_operational() {
        warn!("⛔ [HEALTH_GUARD]: rejecting request, system not operational: {}", reason);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "system_maintenance", "reason": reason })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Verifica el token de portador estático del operador contra
/// `ADMIN_API_TOKEN`. Sin JWT ni identidad delegada — la API de mando
/// de esta flota tiene un único rol administrativo.
pub async fn auth_guard(request: Request, next: Next) -> Result<Response, StatusCode> {
    let expected_token = std::env::var("ADMIN_API_TOKEN").unwrap_or_default();
    if expected_token.is_empty() {
        warn!("⚠️ [AUTH_GUARD]: ADMIN_API_TOKEN not configured, rejecting all admin traffic");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let provided_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided_token {
        Some(token) if token == expected_token => {
            debug!("🔑 [AUTH_GUARD]: operator request authenticated");
            Ok(next.run(request).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
