// [apps/gateway/src/services/device_sweeper.rs]
/*!
 * APARATO: DEVICE PRESENCE SWEEPER (ESTRATO L4)
 * RESPONSABILIDAD: DERIVACIÓN PERIÓDICA DE ONLINE/OFFLINE
 *
 * A diferencia de online/moving, que se derivan en línea en el
 * pipeline de posición, offline solo puede derivarse por ausencia —
 * nadie notifica al servidor que un dispositivo dejó de hablar. Este
 * daemon recorre la caché en memoria y compara `last_seen` contra el
 * umbral de expiración del dispositivo (o el por defecto).
 */

use crate::state::AppState;
use chrono::Utc;
use sentinel_domain_models::{DeviceStatus, Event, EventType};
use std::time::Duration as StdDuration;
use tokio::time::interval;
use tracing::{info, instrument, warn};

const SWEEP_TICK: StdDuration = StdDuration::from_secs(30);
/// Umbral por defecto de inactividad antes de declarar offline, cuando
/// el dispositivo no trae su propio `expires_at`.
const DEFAULT_OFFLINE_THRESHOLD_SECONDS: i64 = 300;

pub async fn spawn_presence_sweep_loop(state: AppState) {
    let mut ticker = interval(SWEEP_TICK);
    info!("👁️  [SWEEPER]: device presence sweep active");
    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

#[instrument(skip(state))]
async fn sweep_once(state: &AppState) {
    let now = Utc::now();

    for device in state.device_registry.snapshot() {
        if device.status != DeviceStatus::Online {
            continue;
        }

        let deadline = device.expires_at.unwrap_or_else(|| {
            device.last_seen.unwrap_or(now) + chrono::Duration::seconds(DEFAULT_OFFLINE_THRESHOLD_SECONDS)
        });

        if now <= deadline {
            continue;
        }

        if let Err(error) = state
            .device_repository
            .update_device_summary(
                &device.unique_id,
                DeviceStatus::Offline,
                device.last_seen.unwrap_or(now),
                device.last_position_id.unwrap_or_default(),
                device.total_distance_meters,
                device.motion_state,
                device.ignition_on,
                device.overspeed,
            )
            .await
        {
            warn!("⚠️ [SWEEPER]: offline transition failed for {}: {}", device.unique_id, error);
            continue;
        }

        let mut updated = device.clone();
        updated.status = DeviceStatus::Offline;
        state.device_registry.upsert(updated.clone());

        let event = Event::new(EventType::DeviceOffline, device.unique_id.clone());
        if let Ok(event_id) = state.event_repository.insert_event(&event).await {
            let mut stored = event;
            stored.id = Some(event_id);
            let event_json = serde_json::to_value(&stored).unwrap_or_default();
            state.event_bus.publish_event(&device.unique_id, event_json);
        }

        let device_json = serde_json::to_value(&updated).unwrap_or_default();
        state.event_bus.publish_device_status(&device.unique_id, device_json, "online");
    }
}
