// [libs/domain-models/src/command.rs]
/*!
 * APARATO: COMMAND & QUEUE CONTRACTS (ESTRATO L2)
 * Modela la máquina de estados de §4.7: PENDING -> SENT -> DELIVERED
 * -> EXECUTED, con ramas de CANCELLED / EXPIRED / FAILED / TIMEOUT.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandStatus {
    Pending,
    Sent,
    Delivered,
    Executed,
    Cancelled,
    Expired,
    Failed,
    Timeout,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Executed
                | CommandStatus::Cancelled
                | CommandStatus::Expired
                | CommandStatus::Failed
                | CommandStatus::Timeout
        )
    }

    /// Verdad de la tabla de transición legal de §4.7 (P4).
    pub fn can_transition_to(self, next: CommandStatus) -> bool {
        use CommandStatus::*;
        matches!(
            (self, next),
            (Pending, Sent)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Sent, Delivered)
                | (Sent, Timeout)
                | (Sent, Cancelled)
                | (Sent, Failed)
                | (Delivered, Executed)
                | (Delivered, Timeout)
                | (Failed, Pending)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub device_id: String,
    pub operator_id: Option<String>,
    pub command_type: String,
    pub priority: CommandPriority,
    pub status: CommandStatus,
    pub params: HashMap<String, serde_json::Value>,
    pub wire_payload: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub response: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Command {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now > at).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandQueueEntry {
    pub command_id: String,
    pub device_id: String,
    pub priority: CommandPriority,
    pub enqueued_at: DateTime<Utc>,
    pub earliest_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl CommandQueueEntry {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.earliest_at.map(|at| now >= at).unwrap_or(true)
            && self.next_attempt_at.map(|at| now >= at).unwrap_or(true)
    }

    /// Orden de despacho: prioridad descendente, luego FIFO por encolado.
    pub fn dispatch_key(&self) -> (std::cmp::Reverse<CommandPriority>, DateTime<Utc>) {
        (std::cmp::Reverse(self.priority), self.enqueued_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub id: String,
    pub name: String,
    pub command_type: String,
    pub priority: CommandPriority,
    pub params: HashMap<String, serde_json::Value>,
    pub max_retries: u32,
    pub channel: String,
    pub usage_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use CommandStatus::*;

    #[test]
    fn happy_path_walks_pending_to_executed() {
        assert!(Pending.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Executed));
        assert!(Executed.is_terminal());
    }

    #[test]
    fn send_failure_retries_through_failed_back_to_pending() {
        // Secuencia exacta del escenario 4: SENT->FAILED->PENDING, repetible.
        assert!(Sent.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Failed.can_transition_to(Executed));
    }

    #[test]
    fn timeout_has_no_legal_outgoing_transition() {
        for candidate in [Pending, Sent, Delivered, Executed, Cancelled, Expired, Failed, Timeout] {
            assert!(!Timeout.can_transition_to(candidate));
        }
        assert!(Timeout.is_terminal());
    }

    #[test]
    fn cannot_skip_or_reverse_states() {
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Executed));
        assert!(!Sent.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Sent));
        assert!(!Executed.can_transition_to(Pending));
    }

    #[test]
    fn cancel_and_expire_reachable_only_from_non_terminal_states() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Sent.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Executed.can_transition_to(Cancelled));
    }
}
