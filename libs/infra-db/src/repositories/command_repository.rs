// [libs/infra-db/src/repositories/command_repository.rs]
/*!
 * Persistencia del motor de comandos (§4.7/§4.8). Las transiciones de
 * estado usan concurrencia optimista: un `UPDATE ... WHERE status =
 * 'x'` cuyo `rows_affected() == 0` señala una carrera perdida o una
 * transición ilegal (P4), nunca un pánico.
 */

use crate::client::DatabaseClient;
use crate::errors::DbError;
use chrono::{DateTime, Utc};
use libsql::params;
use sentinel_domain_models::{Command, CommandPriority, CommandQueueEntry, CommandStatus, CommandTemplate};
use tracing::{instrument, warn};

pub struct CommandRepository {
    database_client: DatabaseClient,
}

impl CommandRepository {
    pub fn new(database_client: DatabaseClient) -> Self {
        Self { database_client }
    }

    /// Inserta el comando y su entrada de cola en una sola transacción.
    #[instrument(skip(self, command))]
    pub async fn enqueue_command(&self, command: &Command) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await?;
        let params_json = serde_json::to_string(&command.params).map_err(|e| DbError::MappingError(e.to_string()))?;

        transaction
            .execute(
                "INSERT INTO commands (
                    id, device_id, operator_id, command_type, priority, status, params_json, wire_payload,
                    retry_count, max_retries, expires_at, response, error, created_at, sent_at, delivered_at, executed_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, NULL, ?12, NULL, NULL, NULL)",
                params![
                    command.id.clone(),
                    command.device_id.clone(),
                    command.operator_id.clone(),
                    command.command_type.clone(),
                    priority_label(command.priority),
                    status_label(command.status),
                    params_json,
                    command.wire_payload.clone(),
                    command.retry_count,
                    command.max_retries,
                    command.expires_at.map(|t| t.to_rfc3339()),
                    command.created_at.to_rfc3339()
                ],
            )
            .await?;

        transaction
            .execute(
                "INSERT INTO command_queue (command_id, device_id, priority, enqueued_at, active)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![command.id.clone(), command.device_id.clone(), priority_label(command.priority), command.created_at.to_rfc3339()],
            )
            .await?;

        transaction.commit().await?;
        Ok(())
    }

    /// Lote de entradas de cola listas para despacho (activas, sin
    /// espera pendiente), ordenadas por prioridad y FIFO.
    #[instrument(skip(self))]
    pub async fn next_due_entries(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<CommandQueueEntry>, DbError> {
        let connection = self.database_client.get_connection()?;
        let query = "
            SELECT command_id, device_id, priority, enqueued_at, earliest_at, attempts, last_attempt_at, next_attempt_at, active
            FROM command_queue
            WHERE active = 1
              AND (earliest_at IS NULL OR earliest_at <= ?1)
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
            ORDER BY CASE priority WHEN 'CRITICAL' THEN 0 WHEN 'HIGH' THEN 1 WHEN 'NORMAL' THEN 2 ELSE 3 END, enqueued_at ASC
            LIMIT ?2
        ";
        let mut rows = connection.query(query, params![now.to_rfc3339(), limit]).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(map_row_to_queue_entry(&row)?);
        }
        Ok(entries)
    }

    #[instrument(skip(self))]
    pub async fn find_command(&self, command_id: &str) -> Result<Command, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, device_id, operator_id, command_type, priority, status, params_json, wire_payload,
                        retry_count, max_retries, expires_at, response, error, created_at, sent_at, delivered_at, executed_at
                 FROM commands WHERE id = ?1",
                params![command_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DbError::CommandNotFound)?;
        map_row_to_command(&row)
    }

    /// Transición de estado con concurrencia optimista. Falla con
    /// `InvalidCommandTransition` si la fila no estaba en `from`.
    #[instrument(skip(self))]
    pub async fn transition_status(
        &self,
        command_id: &str,
        from: CommandStatus,
        to: CommandStatus,
        timestamp_column: Option<&str>,
    ) -> Result<(), DbError> {
        if !from.can_transition_to(to) {
            return Err(DbError::InvalidCommandTransition);
        }

        let connection = self.database_client.get_connection()?;
        let now = Utc::now().to_rfc3339();

        let affected = if let Some(column) = timestamp_column {
            let sql = format!(
                "UPDATE commands SET status = ?1, {column} = ?2 WHERE id = ?3 AND status = ?4"
            );
            connection.execute(&sql, params![status_label(to), now, command_id, status_label(from)]).await?
        } else {
            connection
                .execute(
                    "UPDATE commands SET status = ?1 WHERE id = ?2 AND status = ?3",
                    params![status_label(to), command_id, status_label(from)],
                )
                .await?
        };

        if affected == 0 {
            warn!("⚠️ [COMMAND]: transition {:?} -> {:?} rejected for {}", from, to, command_id);
            return Err(DbError::InvalidCommandTransition);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn deactivate_queue_entry(&self, command_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute("UPDATE command_queue SET active = 0 WHERE command_id = ?1", params![command_id])
            .await?;
        Ok(())
    }

    /// Reprograma una entrada de cola tras un reintento (P5/P6).
    #[instrument(skip(self))]
    pub async fn schedule_retry(&self, command_id: &str, next_attempt_at: DateTime<Utc>) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE command_queue SET attempts = attempts + 1, last_attempt_at = CURRENT_TIMESTAMP, next_attempt_at = ?2
                 WHERE command_id = ?1",
                params![command_id, next_attempt_at.to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    /// Incrementa `retry_count` en el reintento FAILED→PENDING /
    /// TIMEOUT-via-requeue (P7: nunca más de `max_retries + 1` envíos).
    #[instrument(skip(self))]
    pub async fn increment_retry_count(&self, command_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute("UPDATE commands SET retry_count = retry_count + 1 WHERE id = ?1", params![command_id])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn record_response(&self, command_id: &str, response: Option<&str>, error: Option<&str>) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE commands SET response = ?2, error = ?3 WHERE id = ?1",
                params![command_id, response, error],
            )
            .await?;
        Ok(())
    }

    /// Comandos en vuelo (SENT sin confirmar entrega, o DELIVERED sin
    /// confirmar ejecución) cuyo reloj de espera ya venció (P5/P6).
    #[instrument(skip(self))]
    pub async fn find_timed_out_in_flight(&self, ack_cutoff: DateTime<Utc>, exec_cutoff: DateTime<Utc>) -> Result<Vec<Command>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, device_id, operator_id, command_type, priority, status, params_json, wire_payload,
                        retry_count, max_retries, expires_at, response, error, created_at, sent_at, delivered_at, executed_at
                 FROM commands
                 WHERE (status = 'SENT' AND sent_at <= ?1) OR (status = 'DELIVERED' AND delivered_at <= ?2)",
                params![ack_cutoff.to_rfc3339(), exec_cutoff.to_rfc3339()],
            )
            .await?;
        let mut commands = Vec::new();
        while let Some(row) = rows.next().await? {
            commands.push(map_row_to_command(&row)?);
        }
        Ok(commands)
    }

    #[instrument(skip(self))]
    pub async fn create_template(&self, template: &CommandTemplate) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let params_json = serde_json::to_string(&template.params).map_err(|e| DbError::MappingError(e.to_string()))?;
        connection
            .execute(
                "INSERT INTO command_templates (id, name, command_type, priority, params_json, max_retries, channel, usage_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                params![
                    template.id.clone(),
                    template.name.clone(),
                    template.command_type.clone(),
                    priority_label(template.priority),
                    params_json,
                    template.max_retries,
                    template.channel.clone()
                ],
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn increment_template_usage(&self, template_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute("UPDATE command_templates SET usage_count = usage_count + 1 WHERE id = ?1", params![template_id])
            .await?;
        Ok(())
    }
}

pub fn priority_label(priority: CommandPriority) -> &'static str {
    match priority {
        CommandPriority::Low => "LOW",
        CommandPriority::Normal => "NORMAL",
        CommandPriority::High => "HIGH",
        CommandPriority::Critical => "CRITICAL",
    }
}

fn priority_from_label(label: &str) -> CommandPriority {
    match label {
        "LOW" => CommandPriority::Low,
        "HIGH" => CommandPriority::High,
        "CRITICAL" => CommandPriority::Critical,
        _ => CommandPriority::Normal,
    }
}

pub fn status_label(status: CommandStatus) -> &'static str {
    match status {
        CommandStatus::Pending => "PENDING",
        CommandStatus::Sent => "SENT",
        CommandStatus::Delivered => "DELIVERED",
        CommandStatus::Executed => "EXECUTED",
        CommandStatus::Cancelled => "CANCELLED",
        CommandStatus::Expired => "EXPIRED",
        CommandStatus::Failed => "FAILED",
        CommandStatus::Timeout => "TIMEOUT",
    }
}

fn status_from_label(label: &str) -> Result<CommandStatus, DbError> {
    Ok(match label {
        "PENDING" => CommandStatus::Pending,
        "SENT" => CommandStatus::Sent,
        "DELIVERED" => CommandStatus::Delivered,
        "EXECUTED" => CommandStatus::Executed,
        "CANCELLED" => CommandStatus::Cancelled,
        "EXPIRED" => CommandStatus::Expired,
        "FAILED" => CommandStatus::Failed,
        "TIMEOUT" => CommandStatus::Timeout,
        other => return Err(DbError::MappingError(format!("unknown command status '{other}'"))),
    })
}

fn parse_optional_rfc3339(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    raw.map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| DbError::MappingError(e.to_string()))
}

fn map_row_to_command(row: &libsql::Row) -> Result<Command, DbError> {
    let params_json: String = row.get(6)?;
    Ok(Command {
        id: row.get(0)?,
        device_id: row.get(1)?,
        operator_id: row.get(2)?,
        command_type: row.get(3)?,
        priority: priority_from_label(&row.get::<String>(4)?),
        status: status_from_label(&row.get::<String>(5)?)?,
        params: serde_json::from_str(&params_json).map_err(|e| DbError::MappingError(e.to_string()))?,
        wire_payload: row.get(7)?,
        retry_count: row.get::<i64>(8)? as u32,
        max_retries: row.get::<i64>(9)? as u32,
        expires_at: parse_optional_rfc3339(row.get(10)?)?,
        response: row.get(11)?,
        error: row.get(12)?,
        created_at: DateTime::parse_from_rfc3339(&row.get::<String>(13)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        sent_at: parse_optional_rfc3339(row.get(14)?)?,
        delivered_at: parse_optional_rfc3339(row.get(15)?)?,
        executed_at: parse_optional_rfc3339(row.get(16)?)?,
    })
}

fn map_row_to_queue_entry(row: &libsql::Row) -> Result<CommandQueueEntry, DbError> {
    Ok(CommandQueueEntry {
        command_id: row.get(0)?,
        device_id: row.get(1)?,
        priority: priority_from_label(&row.get::<String>(2)?),
        enqueued_at: DateTime::parse_from_rfc3339(&row.get::<String>(3)?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DbError::MappingError(e.to_string()))?,
        earliest_at: parse_optional_rfc3339(row.get(4)?)?,
        attempts: row.get::<i64>(5)? as u32,
        last_attempt_at: parse_optional_rfc3339(row.get(6)?)?,
        next_attempt_at: parse_optional_rfc3339(row.get(7)?)?,
        active: row.get::<i64>(8)? != 0,
    })
}
