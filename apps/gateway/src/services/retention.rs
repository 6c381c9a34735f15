// [apps/gateway/src/services/retention.rs]
/*!
 * APARATO: RETENTION & COMPACTION DAEMON (ESTRATO L4)
 * RESPONSABILIDAD: PURGA PERIÓDICA DE TELEMETRÍA HISTÓRICA
 *
 * Posiciones y eventos crecen sin límite; este daemon aplica una
 * ventana de retención fija y libera espacio en la fachada de
 * persistencia. No hay compactación de índices más allá de lo que el
 * propio motor SQLite haga tras el `DELETE` — el costo de un VACUUM
 * explícito no se justifica en la cadencia de este job.
 */

use crate::state::AppState;
use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use tokio::time::interval;
use tracing::{info, instrument, warn};

const RETENTION_SWEEP_TICK: StdDuration = StdDuration::from_secs(3600);
const POSITION_RETENTION_DAYS: i64 = 90;
const EVENT_RETENTION_DAYS: i64 = 180;

pub async fn spawn_retention_loop(state: AppState) {
    let mut ticker = interval(RETENTION_SWEEP_TICK);
    info!("🧹 [RETENTION]: compaction daemon active");
    loop {
        ticker.tick().await;
        if let Err(error) = run_retention_pass(&state).await {
            warn!("⚠️ [RETENTION]: pass failed: {}", error);
        }
    }
}

#[instrument(skip(state))]
async fn run_retention_pass(state: &AppState) -> anyhow::Result<()> {
    let now = Utc::now();

    let position_cutoff = now - Duration::days(POSITION_RETENTION_DAYS);
    let positions_purged = state.position_repository.delete_older_than(position_cutoff).await?;
    if positions_purged > 0 {
        info!("🧹 [RETENTION]: purged {} positions older than {} days", positions_purged, POSITION_RETENTION_DAYS);
    }

    let event_cutoff = now - Duration::days(EVENT_RETENTION_DAYS);
    let events_purged = state.event_repository.delete_older_than(event_cutoff).await?;
    if events_purged > 0 {
        info!("🧹 [RETENTION]: purged {} events older than {} days", events_purged, EVENT_RETENTION_DAYS);
    }

    Ok(())
}
