// [apps/gateway/src/services/command_dispatcher.rs]
/*!
 * APARATO: COMMAND DISPATCH ENGINE (ESTRATO L4)
 * RESPONSABILIDAD: C7/C8 — COLA DE PRIORIDAD Y MÁQUINA DE ESTADOS PENDING -> EXECUTED
 *
 * Dos daemons cooperan:
 *   - `spawn_dispatch_loop`: drena `command_queue` en orden de
 *     prioridad (§4.7) y escribe la carga de cable al socket vivo del
 *     dispositivo, respetando el tope de un comando en vuelo por
 *     dispositivo (P7).
 *   - `spawn_timeout_sweep_loop`: expira comandos SENT/DELIVERED cuyo
 *     reloj T_ack/T_exec venció (P5/P6), liberando el cupo en vuelo.
 */

use crate::state::AppState;
use chrono::{Duration, Utc};
use sentinel_domain_models::{Command, CommandStatus, Event, EventType};
use std::time::Duration as StdDuration;
use tokio::time::interval;
use tracing::{info, instrument, warn};

const DISPATCH_TICK: StdDuration = StdDuration::from_secs(2);
const TIMEOUT_SWEEP_TICK: StdDuration = StdDuration::from_secs(5);
const DISPATCH_BATCH_SIZE: i64 = 64;

/// Tiempo máximo de espera por un ACK de entrega tras el envío (P5).
const ACK_TIMEOUT_SECONDS: i64 = 30;
/// Tiempo máximo de espera por confirmación de ejecución tras la entrega (P6).
const EXEC_TIMEOUT_SECONDS: i64 = 120;
/// Retraso antes de reintentar una entrada sin conexión viva.
const RETRY_BACKOFF_SECONDS: i64 = 10;

pub async fn spawn_dispatch_loop(state: AppState) {
    let mut ticker = interval(DISPATCH_TICK);
    info!("🚚 [DISPATCHER]: command dispatch loop active");
    loop {
        ticker.tick().await;
        if let Err(error) = dispatch_due_commands(&state).await {
            warn!("⚠️ [DISPATCHER]: dispatch pass failed: {}", error);
        }
    }
}

pub async fn spawn_timeout_sweep_loop(state: AppState) {
    let mut ticker = interval(TIMEOUT_SWEEP_TICK);
    info!("⏱️  [DISPATCHER]: timeout sweep loop active");
    loop {
        ticker.tick().await;
        if let Err(error) = sweep_timed_out_commands(&state).await {
            warn!("⚠️ [DISPATCHER]: timeout sweep failed: {}", error);
        }
    }
}

#[instrument(skip(state))]
async fn dispatch_due_commands(state: &AppState) -> anyhow::Result<()> {
    let now = Utc::now();
    let entries = state.command_repository.next_due_entries(now, DISPATCH_BATCH_SIZE).await?;

    for entry in entries {
        if !entry.is_ready(now) {
            continue;
        }

        {
            let mut in_flight = state.commands_in_flight.lock().await;
            if in_flight.contains(&entry.device_id) {
                continue;
            }
        }

        let command = state.command_repository.find_command(&entry.command_id).await?;
        if command.is_expired(now) {
            expire_command(state, &command).await?;
            continue;
        }

        match try_dispatch_one(state, &command).await? {
            DispatchOutcome::Dispatched => {
                state.commands_in_flight.lock().await.insert(command.device_id.clone());
                state.command_repository.deactivate_queue_entry(&command.id).await?;
            }
            DispatchOutcome::Deferred => {
                let next_attempt_at = now + Duration::seconds(RETRY_BACKOFF_SECONDS);
                state.command_repository.schedule_retry(&command.id, next_attempt_at).await?;
            }
            DispatchOutcome::Requeued => {
                // handle_send_failure ya reprogramó la entrada de cola.
            }
            DispatchOutcome::Failed => {
                state.command_repository.deactivate_queue_entry(&command.id).await?;
            }
        }
    }

    Ok(())
}

enum DispatchOutcome {
    /// Carga de cable escrita al socket, estado transicionado a SENT.
    Dispatched,
    /// Sin conexión viva u otra condición transitoria — permanece en cola
    /// sin cambiar de estado, reintentada por el propio loop (§7: "Command
    /// send failure (link gone) | Keep PENDING").
    Deferred,
    /// Envío intentado y fallido (encoder sin soporte, socket cerrado
    /// a media escritura): SENT→FAILED→PENDING si quedan reintentos,
    /// terminal en FAILED si no (§4.7 diagrama de estados).
    Requeued,
    /// Reintentos agotados; FAILED es terminal.
    Failed,
}

/// Intenta escribir la carga de cable al socket vivo del dispositivo.
async fn try_dispatch_one(state: &AppState, command: &Command) -> anyhow::Result<DispatchOutcome> {
    let device = match state.device_registry.get(&command.device_id) {
        Some(device) => device,
        None => {
            warn!("⚠️ [DISPATCHER]: command {} targets unknown device {}", command.id, command.device_id);
            return Ok(DispatchOutcome::Deferred);
        }
    };

    let Some(encoder) = state.protocol_encoders.get(device.protocol.as_str()) else {
        warn!("⚠️ [DISPATCHER]: no command encoder registered for protocol {}", device.protocol);
        return Ok(DispatchOutcome::Deferred);
    };

    let wire_payload = match encoder.encode_command(&command.command_type, &command.params) {
        Ok(payload) => payload,
        Err(error) => {
            warn!("⚠️ [DISPATCHER]: encode failed for command {}: {}", command.id, error);
            return fail_unsupported_encode(state, command, &error.to_string()).await;
        }
    };

    let connections = state.live_connections.lock().await;
    let Some(sender) = connections.get(&command.device_id).cloned() else {
        return Ok(DispatchOutcome::Deferred);
    };
    drop(connections);

    if sender.send(wire_payload.into_bytes()).await.is_err() {
        return handle_send_failure(state, command, "live connection closed mid-write").await;
    }

    state
        .command_repository
        .transition_status(&command.id, CommandStatus::Pending, CommandStatus::Sent, Some("sent_at"))
        .await?;

    let event = Event::new(EventType::QueuedCommandSent, command.device_id.clone())
        .with_attribute("commandId", command.id.clone().into())
        .with_attribute("commandType", command.command_type.clone().into());
    if let Ok(event_id) = state.event_repository.insert_event(&event).await {
        let mut stored = event;
        stored.id = Some(event_id);
        let event_json = serde_json::to_value(&stored).unwrap_or_default();
        state.event_bus.publish_event(&command.device_id, event_json);
    }

    Ok(DispatchOutcome::Dispatched)
}

/// Encode no soportado por el protocolo del dispositivo (§7: "Command
/// encode unsupported | FAILED (no retry); record error"). A diferencia
/// de un fallo de envío sobre un enlace vivo, esto nunca es transitorio
/// — el encoder seguirá rechazando los mismos parámetros en el próximo
/// intento — así que no consume cupo de reintento: PENDING→SENT→FAILED
/// terminal, sin pasar por `handle_send_failure`.
async fn fail_unsupported_encode(state: &AppState, command: &Command, error: &str) -> anyhow::Result<DispatchOutcome> {
    state.command_repository.record_response(&command.id, None, Some(error)).await?;

    state
        .command_repository
        .transition_status(&command.id, CommandStatus::Pending, CommandStatus::Sent, None)
        .await?;
    state
        .command_repository
        .transition_status(&command.id, CommandStatus::Sent, CommandStatus::Failed, None)
        .await?;

    warn!("❌ [DISPATCHER]: command {} failed, encoder rejected params", command.id);
    Ok(DispatchOutcome::Failed)
}

/// Recorre SENT→FAILED del diagrama de estados tras un fallo de envío
/// sobre un enlace vivo (socket cerrado a media escritura — transitorio,
/// a diferencia de un encode no soportado); si quedan reintentos, vuelve
/// a PENDING con backoff exponencial (`min(2^retry_count, 300s)`, §4.7);
/// si no, FAILED queda terminal.
async fn handle_send_failure(state: &AppState, command: &Command, error: &str) -> anyhow::Result<DispatchOutcome> {
    state.command_repository.record_response(&command.id, None, Some(error)).await?;

    state
        .command_repository
        .transition_status(&command.id, CommandStatus::Pending, CommandStatus::Sent, None)
        .await?;
    state
        .command_repository
        .transition_status(&command.id, CommandStatus::Sent, CommandStatus::Failed, None)
        .await?;

    if command.retry_count >= command.max_retries {
        warn!("❌ [DISPATCHER]: command {} failed, retries exhausted", command.id);
        return Ok(DispatchOutcome::Failed);
    }

    state.command_repository.increment_retry_count(&command.id).await?;
    state
        .command_repository
        .transition_status(&command.id, CommandStatus::Failed, CommandStatus::Pending, None)
        .await?;

    let backoff_seconds = 2i64.saturating_pow(command.retry_count).min(300);
    let next_attempt_at = Utc::now() + Duration::seconds(backoff_seconds);
    state.command_repository.schedule_retry(&command.id, next_attempt_at).await?;

    info!("🔁 [DISPATCHER]: command {} requeued, retry {}/{}", command.id, command.retry_count + 1, command.max_retries);
    Ok(DispatchOutcome::Requeued)
}

async fn expire_command(state: &AppState, command: &Command) -> anyhow::Result<()> {
    state
        .command_repository
        .transition_status(&command.id, command.status, CommandStatus::Expired, None)
        .await
        .ok();
    state.command_repository.deactivate_queue_entry(&command.id).await?;
    state.commands_in_flight.lock().await.remove(&command.device_id);
    Ok(())
}

#[instrument(skip(state))]
async fn sweep_timed_out_commands(state: &AppState) -> anyhow::Result<()> {
    let now = Utc::now();
    let ack_cutoff = now - Duration::seconds(ACK_TIMEOUT_SECONDS);
    let exec_cutoff = now - Duration::seconds(EXEC_TIMEOUT_SECONDS);

    let stale = state.command_repository.find_timed_out_in_flight(ack_cutoff, exec_cutoff).await?;

    for command in stale {
        warn!("⏱️  [DISPATCHER]: command {} timed out in status {:?}", command.id, command.status);

        let transitioned = state
            .command_repository
            .transition_status(&command.id, command.status, CommandStatus::Timeout, None)
            .await
            .is_ok();

        if transitioned {
            state.commands_in_flight.lock().await.remove(&command.device_id);

            let event = Event::new(EventType::CommandResult, command.device_id.clone())
                .with_attribute("commandId", command.id.clone().into())
                .with_attribute("status", "TIMEOUT".into());
            if let Ok(event_id) = state.event_repository.insert_event(&event).await {
                let mut stored = event;
                stored.id = Some(event_id);
                let event_json = serde_json::to_value(&stored).unwrap_or_default();
                state.event_bus.publish_event(&command.device_id, event_json);
            }

            if command.retry_count < command.max_retries {
                requeue_as_retry(state, &command).await?;
            }
        }
    }

    Ok(())
}

/// TIMEOUT es terminal (P4) — un reintento nunca resucita el comando
/// vencido, encola uno nuevo heredando parámetros y contador de
/// reintentos incrementado.
async fn requeue_as_retry(state: &AppState, original: &Command) -> anyhow::Result<()> {
    let mut retry_command = original.clone();
    retry_command.id = uuid::Uuid::new_v4().to_string();
    retry_command.status = CommandStatus::Pending;
    retry_command.retry_count = original.retry_count + 1;
    retry_command.created_at = Utc::now();
    retry_command.sent_at = None;
    retry_command.delivered_at = None;
    retry_command.executed_at = None;
    retry_command.response = None;
    retry_command.error = None;

    state.command_repository.enqueue_command(&retry_command).await?;
    info!("🔁 [DISPATCHER]: requeued {} as {} (attempt {})", original.id, retry_command.id, retry_command.retry_count);
    Ok(())
}
