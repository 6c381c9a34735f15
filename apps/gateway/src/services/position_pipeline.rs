// [apps/gateway/src/services/position_pipeline.rs]
/*!
 * APARATO: POSITION PROCESSING PIPELINE (ESTRATO L4)
 * RESPONSABILIDAD: C4 — RESOLUCIÓN, VALIDACIÓN, PERSISTENCIA Y DERIVACIÓN
 *
 * Cada worker consume tramas de un único canal mpsc, partición fijada
 * por hash del identificador de origen (§4.5). Esto garantiza que dos
 * tramas del mismo dispositivo se procesan en el orden en que llegaron
 * al canal — nunca reordenadas, nunca en paralelo entre sí (P1).
 *
 * Pasos por trama (solo se omiten si una etapa previa decide que no
 * aplica el resto):
 *   1. Resolver el propietario (dispositivo registrado o cuarentena).
 *      Una trama de cuarentena todavía produce una Position contra el
 *      Unknown Device (§7) — solo se le omite la derivación de eventos,
 *      que depende de un estado previo de dispositivo que no existe.
 *   2. Si es heartbeat sin fix, solo refrescar presencia y retornar.
 *   3. Validar el fix (P2/B2); descartar silenciosamente si inválido.
 *   4. Construir y persistir la posición (idempotente por clave lógica, R2).
 *   5. Derivar movimiento/encendido/exceso de velocidad y distancia acumulada.
 *   6. Evaluar membresía de geofence y encolar eventos de entrada/salida (C5/C6).
 *   7. Actualizar el resumen del dispositivo y la caché en memoria.
 *   8. Difundir posición y eventos derivados al bus de suscripción.
 */

use crate::services::event_engine::{self, DerivedSignals};
use crate::state::{AppState, IngestedFrame};
use chrono::Utc;
use sentinel_core_geo::haversine_meters;
use sentinel_domain_models::{Device, DeviceStatus, MotionState, Owner, Position, UnknownDevice};
use sentinel_infra_transport::FrameKind;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

pub fn spawn_position_workers(state: AppState, mut receivers: Vec<mpsc::Receiver<IngestedFrame>>) {
    for (index, mut receiver) in receivers.drain(..).enumerate() {
        let worker_state = state.clone();
        tokio::spawn(async move {
            debug!("📡 [PIPELINE]: position worker {} online", index);
            while let Some(ingested) = receiver.recv().await {
                process_ingested_frame(&worker_state, ingested).await;
            }
            warn!("🛑 [PIPELINE]: position worker {} channel closed", index);
        });
    }
}

#[instrument(skip(state, ingested), fields(source_id = %ingested.frame.source_id, protocol = %ingested.protocol))]
async fn process_ingested_frame(state: &AppState, ingested: IngestedFrame) {
    let IngestedFrame { frame, protocol, listener_port } = ingested;

    let device = match state.device_registry.get(&frame.source_id) {
        Some(device) => device,
        None => match state.device_repository.find_by_unique_id(&frame.source_id).await {
            Ok(Some(device)) => {
                state.device_registry.upsert(device.clone());
                device
            }
            Ok(None) => {
                quarantine_frame(state, &frame, protocol, listener_port).await;
                process_unknown_device_frame(state, &frame, protocol).await;
                return;
            }
            Err(error) => {
                warn!("⚠️ [PIPELINE]: device lookup failed for {}: {}", frame.source_id, error);
                return;
            }
        },
    };

    if matches!(frame.kind, FrameKind::Heartbeat) {
        refresh_presence_only(state, &device).await;
        return;
    }

    let position = build_position_from_frame(&frame, protocol, Owner::Device(device.unique_id.clone()));

    if !position.has_valid_fix() {
        debug!("🚫 [PIPELINE]: frame from {} rejected, invalid fix", device.unique_id);
        return;
    }

    // Se busca la posición anterior antes de insertar: `insert_position`
    // es idempotente (R2) y en una re-ingesta devolvería la misma fila
    // que acabamos de pedir como "anterior", anulando el cálculo de
    // distancia (B1).
    let previous_position = state.position_repository.recent_for_device(&device.unique_id, 1).await.ok().and_then(|mut rows| rows.pop());

    let position_id = match state.position_repository.insert_position(&position).await {
        Ok(id) => id,
        Err(error) => {
            warn!("⚠️ [PIPELINE]: position insert failed for {}: {}", device.unique_id, error);
            return;
        }
    };

    let distance_delta_meters = previous_position
        .as_ref()
        .filter(|previous| previous.valid)
        .map(|previous| haversine_meters(previous.latitude, previous.longitude, position.latitude, position.longitude))
        .unwrap_or(0.0);

    let signals = event_engine::derive(state, &device, &position, distance_delta_meters).await;

    apply_derived_state(state, &device, &position, position_id, signals.clone()).await;

    let position_json = serde_json::to_value(&position).unwrap_or_default();
    state.event_bus.publish_position(&device.unique_id, position_json);

    for event in signals.events {
        if let Ok(event_id) = state.event_repository.insert_event(&event).await {
            let mut stored = event.clone();
            stored.id = Some(event_id);
            let event_json = serde_json::to_value(&stored).unwrap_or_default();
            state.event_bus.publish_event(&device.unique_id, event_json);
        }
    }
}

async fn apply_derived_state(
    state: &AppState,
    device: &Device,
    position: &Position,
    position_id: i64,
    signals: DerivedSignals,
) {
    let new_total_distance = device.total_distance_meters + signals.distance_delta_meters;
    let new_status = DeviceStatus::Online;

    if let Err(error) = state
        .device_repository
        .update_device_summary(
            &device.unique_id,
            new_status,
            position.device_time,
            position_id,
            new_total_distance,
            signals.motion_state,
            signals.ignition_on,
            signals.overspeed,
        )
        .await
    {
        warn!("⚠️ [PIPELINE]: device summary update failed for {}: {}", device.unique_id, error);
        return;
    }

    let mut updated_device = device.clone();
    updated_device.status = new_status;
    updated_device.last_seen = Some(position.device_time);
    updated_device.last_position_id = Some(position_id);
    updated_device.total_distance_meters = new_total_distance;
    updated_device.motion_state = signals.motion_state;
    updated_device.ignition_on = signals.ignition_on;
    updated_device.overspeed = signals.overspeed;

    let status_changed = device.status != new_status;
    state.device_registry.upsert(updated_device.clone());

    if status_changed {
        let device_json = serde_json::to_value(&updated_device).unwrap_or_default();
        state.event_bus.publish_device_status(&device.unique_id, device_json, device_status_label(device.status));
    }
}

fn build_position_from_frame(frame: &sentinel_infra_transport::CanonicalFrame, protocol: &'static str, owner: Owner) -> Position {
    let valid_fix = frame.field_bool("valid").unwrap_or(true);
    let latitude = frame.field_f64("lat").unwrap_or(f64::NAN);
    let longitude = frame.field_f64("lon").unwrap_or(f64::NAN);

    Position {
        id: None,
        owner,
        protocol: protocol.to_string(),
        server_time: Utc::now(),
        device_time: frame.device_time,
        fix_time: frame.device_time,
        valid: valid_fix,
        latitude,
        longitude,
        altitude: frame.field_f64("altitude").unwrap_or(0.0),
        speed_knots: frame.field_f64("speed_knots").unwrap_or(0.0),
        course: frame.field_f64("course").unwrap_or(0.0),
        accuracy: frame.field_f64("accuracy").unwrap_or(0.0),
        attributes: frame.fields.clone(),
    }
}

/// Persiste y difunde una posición para una trama de un `source_id` no
/// registrado (§7: "Unknown device | Persist to Unknown Devices; still
/// create positions/events against it"). Sin un `Device` homologado no
/// hay estado previo de movimiento/encendido/velocidad contra el cual
/// diferenciar — el motor de eventos (C6) depende de ese estado — así
/// que aquí solo se persiste y publica la posición; no se deriva ningún
/// evento (escenario semilla 1: "no events (first frame)"). Si el
/// dispositivo es adoptado más tarde, sus tramas futuras fluyen por el
/// camino registrado y sí derivan eventos con normalidad.
async fn process_unknown_device_frame(state: &AppState, frame: &sentinel_infra_transport::CanonicalFrame, protocol: &'static str) {
    if matches!(frame.kind, FrameKind::Heartbeat) {
        return;
    }

    let position = build_position_from_frame(frame, protocol, Owner::Unknown(frame.source_id.clone()));

    if !position.has_valid_fix() {
        debug!("🚫 [PIPELINE]: quarantine frame from {} rejected, invalid fix", frame.source_id);
        return;
    }

    let position_id = match state.position_repository.insert_position(&position).await {
        Ok(id) => id,
        Err(error) => {
            warn!("⚠️ [PIPELINE]: quarantine position insert failed for {}: {}", frame.source_id, error);
            return;
        }
    };

    debug!("📍 [PIPELINE]: stored quarantine position {} for unknown device {}", position_id, frame.source_id);
    let position_json = serde_json::to_value(&position).unwrap_or_default();
    state.event_bus.publish_position(&frame.source_id, position_json);
}

async fn refresh_presence_only(state: &AppState, device: &Device) {
    let now = Utc::now();
    if let Err(error) = state
        .device_repository
        .update_device_summary(
            &device.unique_id,
            DeviceStatus::Online,
            now,
            device.last_position_id.unwrap_or_default(),
            device.total_distance_meters,
            device.motion_state,
            device.ignition_on,
            device.overspeed,
        )
        .await
    {
        warn!("⚠️ [PIPELINE]: heartbeat presence refresh failed for {}: {}", device.unique_id, error);
        return;
    }
    let mut updated = device.clone();
    updated.last_seen = Some(now);
    updated.status = DeviceStatus::Online;
    state.device_registry.upsert(updated);
}

async fn quarantine_frame(state: &AppState, frame: &sentinel_infra_transport::CanonicalFrame, protocol: &'static str, listener_port: u16) {
    let raw_frame_text = String::from_utf8_lossy(&frame.raw).to_string();
    let parsed_payload = serde_json::to_value(&frame.fields).ok();

    if let Err(error) = state
        .device_repository
        .touch_unknown_device(&frame.source_id, protocol, listener_port, Some(&raw_frame_text), parsed_payload.as_ref())
        .await
    {
        warn!("⚠️ [PIPELINE]: unknown device touch failed for {}: {}", frame.source_id, error);
        return;
    }

    if let Ok(Some(unknown)) = state.device_repository.find_unknown(&frame.source_id, protocol).await {
        let unknown_json = serde_json::to_value(&unknown).unwrap_or_default();
        state.device_registry.touch_unknown(unknown.clone());
        state.event_bus.publish_unknown_device(unknown_json);
    } else {
        let fallback = UnknownDevice::first_contact(frame.source_id.clone(), protocol.to_string(), listener_port);
        state.device_registry.touch_unknown(fallback);
    }
}

fn device_status_label(status: DeviceStatus) -> &'static str {
    match status {
        DeviceStatus::Online => "online",
        DeviceStatus::Offline => "offline",
        DeviceStatus::Unknown => "unknown",
    }
}
