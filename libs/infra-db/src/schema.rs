// [libs/infra-db/src/schema.rs]
/*!
 * APARATO: SCHEMA GOVERNANCE (ESTRATO L3)
 * RESPONSABILIDAD: SOLIDIFICACIÓN IDEMPOTENTE DE LAS TABLAS TÁCTICAS
 *
 * Tres estratos, aplicados en orden: génesis de tablas (CREATE TABLE
 * IF NOT EXISTS), evolución de columnas (ALTER TABLE, tolerante a
 * "duplicate column name" para despliegues en caliente), y finalmente
 * índices de aceleración.
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    ("TABLE_DEVICES", r#"
        CREATE TABLE IF NOT EXISTS devices (
            unique_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            protocol TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'offline',
            last_seen DATETIME,
            last_position_id INTEGER,
            total_distance_meters REAL NOT NULL DEFAULT 0.0,
            motion_state TEXT NOT NULL DEFAULT 'stopped',
            ignition_on INTEGER NOT NULL DEFAULT 0,
            overspeed INTEGER NOT NULL DEFAULT 0,
            speed_limit_kmh REAL NOT NULL DEFAULT 0.0,
            expires_at DATETIME,
            group_id TEXT,
            owner_id TEXT,
            attributes_json TEXT NOT NULL DEFAULT '{}'
        );
    "#),
    ("TABLE_UNKNOWN_DEVICES", r#"
        CREATE TABLE IF NOT EXISTS unknown_devices (
            unique_id TEXT NOT NULL,
            protocol TEXT NOT NULL,
            listener_port INTEGER NOT NULL,
            first_seen DATETIME NOT NULL,
            last_seen DATETIME NOT NULL,
            connection_count INTEGER NOT NULL DEFAULT 1,
            last_raw_frame TEXT,
            last_parsed_payload_json TEXT,
            registered INTEGER NOT NULL DEFAULT 0,
            adopted_device_id TEXT,
            PRIMARY KEY (unique_id, protocol)
        );
    "#),
    ("TABLE_POSITIONS", r#"
        CREATE TABLE IF NOT EXISTS positions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_kind TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            protocol TEXT NOT NULL,
            server_time DATETIME NOT NULL,
            device_time DATETIME NOT NULL,
            fix_time DATETIME NOT NULL,
            valid INTEGER NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            altitude REAL NOT NULL DEFAULT 0.0,
            speed_knots REAL NOT NULL DEFAULT 0.0,
            course REAL NOT NULL DEFAULT 0.0,
            accuracy REAL NOT NULL DEFAULT 0.0,
            attributes_json TEXT NOT NULL DEFAULT '{}',
            logical_key TEXT NOT NULL UNIQUE
        );
    "#),
    ("TABLE_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            event_time DATETIME NOT NULL,
            device_id TEXT NOT NULL,
            position_id INTEGER,
            geofence_id TEXT,
            maintenance_id TEXT,
            attributes_json TEXT NOT NULL DEFAULT '{}'
        );
    "#),
    ("TABLE_GEOFENCES", r#"
        CREATE TABLE IF NOT EXISTS geofences (
            name TEXT PRIMARY KEY,
            description TEXT,
            geometry_json TEXT NOT NULL,
            disabled INTEGER NOT NULL DEFAULT 0,
            calendar_id TEXT,
            attributes_json TEXT NOT NULL DEFAULT '{}',
            version INTEGER NOT NULL DEFAULT 1
        );
    "#),
    ("TABLE_COMMANDS", r#"
        CREATE TABLE IF NOT EXISTS commands (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            operator_id TEXT,
            command_type TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'NORMAL',
            status TEXT NOT NULL DEFAULT 'PENDING',
            params_json TEXT NOT NULL DEFAULT '{}',
            wire_payload TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            expires_at DATETIME,
            response TEXT,
            error TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            sent_at DATETIME,
            delivered_at DATETIME,
            executed_at DATETIME
        );
    "#),
    ("TABLE_COMMAND_QUEUE", r#"
        CREATE TABLE IF NOT EXISTS command_queue (
            command_id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'NORMAL',
            enqueued_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            earliest_at DATETIME,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt_at DATETIME,
            next_attempt_at DATETIME,
            active INTEGER NOT NULL DEFAULT 1
        );
    "#),
    ("TABLE_COMMAND_TEMPLATES", r#"
        CREATE TABLE IF NOT EXISTS command_templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            command_type TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'NORMAL',
            params_json TEXT NOT NULL DEFAULT '{}',
            max_retries INTEGER NOT NULL DEFAULT 3,
            channel TEXT NOT NULL,
            usage_count INTEGER NOT NULL DEFAULT 0
        );
    "#),
];

const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("DEVICE_GROUP_ID", "ALTER TABLE devices ADD COLUMN group_id TEXT"),
    ("DEVICE_OWNER_ID", "ALTER TABLE devices ADD COLUMN owner_id TEXT"),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_POSITIONS_OWNER_TIME", "CREATE INDEX IF NOT EXISTS idx_positions_owner_time ON positions(owner_id, device_time);"),
    ("IDX_EVENTS_DEVICE_TIME", "CREATE INDEX IF NOT EXISTS idx_events_device_time ON events(device_id, event_time);"),
    ("IDX_EVENTS_GEOFENCE_DEDUP", "CREATE INDEX IF NOT EXISTS idx_events_geofence_dedup ON events(device_id, geofence_id, event_type, event_time);"),
    ("IDX_COMMAND_QUEUE_DISPATCH", "CREATE INDEX IF NOT EXISTS idx_command_queue_dispatch ON command_queue(active, device_id, priority, enqueued_at);"),
    ("IDX_UNKNOWN_DEVICES_LAST_SEEN", "CREATE INDEX IF NOT EXISTS idx_unknown_devices_last_seen ON unknown_devices(last_seen);"),
];

#[instrument(skip(database_connection))]
pub async fn apply_full_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA]: applying schema");
    solidify_base_tables(database_connection).await?;
    apply_evolutionary_strata(database_connection).await?;
    harden_access_layer(database_connection).await?;
    info!("✅ [SCHEMA]: schema up to date");
    Ok(())
}

async fn solidify_base_tables(db: &Connection) -> Result<()> {
    for (identifier, sql) in BASE_TABLES {
        debug!("  ↳ solidifying: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("table solidification failed: {identifier}"))?;
    }
    Ok(())
}

async fn apply_evolutionary_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => info!("  🟢 applied evolutionary stratum {}", identifier),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ {} already applied", identifier);
                } else {
                    warn!("  ⚠️ {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ hardening: {}", identifier);
        db.execute(*sql, ())
            .await
            .with_context(|| format!("index hardening failed: {identifier}"))?;
    }
    Ok(())
}
