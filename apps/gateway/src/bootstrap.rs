// [apps/gateway/src/bootstrap.rs]
/*!
 * APARATO: ASYNC SYSTEM BOOTSTRAP (ESTRATO L3)
 * RESPONSABILIDAD: HIDRATACIÓN DE CACHÉS EN MEMORIA ANTES DE OPERAR
 *
 * Corre en segundo plano para no bloquear el bind del puerto HTTP: el
 * servicio responde en modo mantenimiento hasta que el registro de
 * dispositivos y el índice de geofences quedan poblados desde la
 * fachada de persistencia.
 */

use crate::state::{AppState, SystemMode};
use tracing::{error, info, instrument};

pub struct Bootstrap;

impl Bootstrap {
    #[instrument(skip(state))]
    pub fn spawn_diagnostics(state: AppState) {
        tokio::spawn(async move {
            info!("🩺 [BOOTSTRAP]: hydrating in-memory caches...");

            match Self::hydrate_caches(&state).await {
                Ok(()) => {
                    info!("✅ [BOOTSTRAP]: caches hydrated, entering operational mode");
                    state.set_mode(SystemMode::Operational);
                }
                Err(error) => {
                    let reason = format!("bootstrap hydration failed: {error}");
                    error!("❌ [BOOTSTRAP]: {}", reason);
                    state.set_mode(SystemMode::Maintenance(reason));
                }
            }
        });
    }

    async fn hydrate_caches(state: &AppState) -> anyhow::Result<()> {
        let devices = state.device_repository.list_all().await?;
        info!("📇 [BOOTSTRAP]: loaded {} registered devices", devices.len());
        state.device_registry.hydrate(devices);

        let geofences = state.geofence_repository.list_active_geofences().await?;
        info!("🗺️  [BOOTSTRAP]: loaded {} active geofences", geofences.len());
        state.geofence_index.rebuild(geofences);

        Ok(())
    }
}
