// [apps/gateway/src/handlers/osmand_http.rs]
/*!
 * APARATO: OSMAND REQUEST/RESPONSE INGESTION (ESTRATO L4)
 * RESPONSABILIDAD: ADAPTADOR HTTP PARA EL TRANSPORTE REQUESTRESPONSE (§4.3)
 *
 * OsmAnd reporta por GET con parámetros de query, o por POST con
 * cuerpo JSON — a veces anidado bajo `location.coords`. El decodificador
 * ya sabe distinguir ambos formatos; este handler solo decide cuál
 * buffer de bytes pasarle.
 */

use crate::state::{AppState, IngestedFrame};
use axum::{
    extract::{OriginalUri, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::{instrument, warn};

#[instrument(skip(state, body))]
pub async fn ingest_osmand_report(State(state): State<AppState>, OriginalUri(uri): OriginalUri, body: Bytes) -> impl IntoResponse {
    let Some(decoder) = state.protocol_decoders.get("osmand") else {
        warn!("⚠️ [OSMAND_HTTP]: no decoder registered for osmand");
        return (StatusCode::SERVICE_UNAVAILABLE, "osmand decoder unavailable");
    };

    let decode_input: Vec<u8> = if !body.is_empty() {
        body.to_vec()
    } else {
        uri.query().unwrap_or_default().as_bytes().to_vec()
    };

    let frames = match decoder.decode(&decode_input, None) {
        Ok(frames) => frames,
        Err(error) => {
            warn!("⚠️ [OSMAND_HTTP]: decode failed: {}", error);
            return (StatusCode::BAD_REQUEST, "malformed report");
        }
    };

    for frame in frames {
        let ingested = IngestedFrame { frame, protocol: decoder.protocol_name(), listener_port: decoder.listener_port() };
        let worker = state.worker_for(&ingested.frame.source_id);
        if worker.send(ingested).await.is_err() {
            warn!("⚠️ [OSMAND_HTTP]: position worker channel closed");
        }
    }

    (StatusCode::OK, "OK")
}
