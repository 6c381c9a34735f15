// [apps/gateway/src/handlers/admin.rs]
/*!
 * APARATO: COMMAND ADMINISTRATION API (ESTRATO L4)
 * RESPONSABILIDAD: SUPERFICIE REST DEL PLANO DE MANDO (§4.7/§4.8)
 *
 * Encola, cancela y reintenta comandos; gestiona plantillas. Toda
 * escritura pasa por la fachada de persistencia — este estrato nunca
 * toca el socket del dispositivo directamente, eso es trabajo del
 * despachador en segundo plano.
 */

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use sentinel_domain_models::{Command, CommandPriority, CommandStatus, CommandTemplate};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{instrument, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EnqueueCommandRequest {
    pub device_id: String,
    pub operator_id: Option<String>,
    pub command_type: String,
    #[serde(default)]
    pub priority: Option<CommandPriority>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[instrument(skip(state, request))]
pub async fn enqueue_command(State(state): State<AppState>, Json(request): Json<EnqueueCommandRequest>) -> impl IntoResponse {
    if state.device_registry.get(&request.device_id).is_none() {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "device not registered" }))).into_response();
    }

    let command = Command {
        id: Uuid::new_v4().to_string(),
        device_id: request.device_id,
        operator_id: request.operator_id,
        command_type: request.command_type,
        priority: request.priority.unwrap_or(CommandPriority::Normal),
        status: CommandStatus::Pending,
        params: request.params,
        wire_payload: None,
        retry_count: 0,
        max_retries: request.max_retries.unwrap_or(3),
        expires_at: request.expires_in_seconds.map(|seconds| Utc::now() + chrono::Duration::seconds(seconds)),
        response: None,
        error: None,
        created_at: Utc::now(),
        sent_at: None,
        delivered_at: None,
        executed_at: None,
    };

    match state.command_repository.enqueue_command(&command).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "commandId": command.id }))).into_response(),
        Err(error) => {
            warn!("⚠️ [ADMIN]: enqueue_command failed: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.to_string() }))).into_response()
        }
    }
}

#[instrument(skip(state))]
pub async fn cancel_command(State(state): State<AppState>, Path(command_id): Path<String>) -> impl IntoResponse {
    let command = match state.command_repository.find_command(&command_id).await {
        Ok(command) => command,
        Err(_) => return (StatusCode::NOT_FOUND, Json(json!({ "error": "command not found" }))).into_response(),
    };

    match state.command_repository.transition_status(&command_id, command.status, CommandStatus::Cancelled, None).await {
        Ok(()) => {
            state.command_repository.deactivate_queue_entry(&command_id).await.ok();
            state.commands_in_flight.lock().await.remove(&command.device_id);
            (StatusCode::OK, Json(json!({ "status": "CANCELLED" }))).into_response()
        }
        Err(error) => (StatusCode::CONFLICT, Json(json!({ "error": error.to_string() }))).into_response(),
    }
}

#[instrument(skip(state))]
pub async fn retry_command(State(state): State<AppState>, Path(command_id): Path<String>) -> impl IntoResponse {
    let original = match state.command_repository.find_command(&command_id).await {
        Ok(command) => command,
        Err(_) => return (StatusCode::NOT_FOUND, Json(json!({ "error": "command not found" }))).into_response(),
    };

    if !original.status.is_terminal() {
        return (StatusCode::CONFLICT, Json(json!({ "error": "command still in flight" }))).into_response();
    }

    let mut retry_command = original.clone();
    retry_command.id = Uuid::new_v4().to_string();
    retry_command.status = CommandStatus::Pending;
    retry_command.retry_count = original.retry_count + 1;
    retry_command.created_at = Utc::now();
    retry_command.sent_at = None;
    retry_command.delivered_at = None;
    retry_command.executed_at = None;
    retry_command.response = None;
    retry_command.error = None;

    match state.command_repository.enqueue_command(&retry_command).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "commandId": retry_command.id }))).into_response(),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.to_string() }))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub command_type: String,
    #[serde(default)]
    pub priority: Option<CommandPriority>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    pub channel: String,
}

#[instrument(skip(state, request))]
pub async fn create_template(State(state): State<AppState>, Json(request): Json<CreateTemplateRequest>) -> impl IntoResponse {
    let template = CommandTemplate {
        id: Uuid::new_v4().to_string(),
        name: request.name,
        command_type: request.command_type,
        priority: request.priority.unwrap_or(CommandPriority::Normal),
        params: request.params,
        max_retries: request.max_retries.unwrap_or(3),
        channel: request.channel,
        usage_count: 0,
    };

    match state.command_repository.create_template(&template).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "templateId": template.id }))).into_response(),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.to_string() }))).into_response(),
    }
}

#[instrument(skip(state))]
pub async fn use_template(State(state): State<AppState>, Path(template_id): Path<String>) -> impl IntoResponse {
    match state.command_repository.increment_template_usage(&template_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "applied" }))).into_response(),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.to_string() }))).into_response(),
    }
}
