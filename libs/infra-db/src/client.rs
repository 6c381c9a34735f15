// [libs/infra-db/src/client.rs]
/*!
 * APARATO: DATABASE CONNECTION CLIENT (ESTRATO L3)
 * RESPONSABILIDAD: ENLACE CON EL MOTOR DE PERSISTENCIA Y BOOTSTRAP DE ESQUEMA
 *
 * En modo memoria, ancla una conexión viva para que SQLite no purgue
 * las tablas entre adquisiciones — sin el ancla cada `connect()` vería
 * una base de datos vacía.
 */

use crate::errors::DbError;
use crate::schema::apply_full_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct DatabaseClient {
    driver: Arc<Database>,
    _memory_anchor: Option<Arc<Connection>>,
}

impl DatabaseClient {
    #[instrument(skip(access_token))]
    pub async fn connect(connection_url: &str, access_token: Option<String>) -> Result<Self, DbError> {
        if connection_url.is_empty() {
            return Err(DbError::ConfigurationError("DATABASE_URL is empty".into()));
        }

        info!("🔌 [DATABASE]: connecting to [{}]", connection_url);

        let is_remote = connection_url.starts_with("libsql://") || connection_url.starts_with("https://");
        let is_memory = connection_url.contains(":memory:") || connection_url.contains("mode=memory");

        let driver = if is_remote {
            let token = access_token
                .ok_or_else(|| DbError::ConfigurationError("remote database requires an access token".into()))?;
            Builder::new_remote(connection_url.to_string(), token).build().await
        } else {
            Builder::new_local(connection_url).build().await
        }
        .map_err(|e| DbError::ConnectionError(format!("driver build failed: {e}")))?;

        let driver = Arc::new(driver);
        let mut anchor = None;

        if is_memory {
            let anchor_connection = driver
                .connect()
                .map_err(|e| DbError::ConnectionError(format!("anchor connection failed: {e}")))?;
            apply_full_schema(&anchor_connection)
                .await
                .map_err(|e| DbError::ConnectionError(format!("schema bootstrap failed: {e}")))?;
            anchor = Some(Arc::new(anchor_connection));
            info!("⚓ [DATABASE]: memory-mode schema anchored");
        } else {
            let bootstrap_connection = driver
                .connect()
                .map_err(|e| DbError::ConnectionError(format!("bootstrap connection failed: {e}")))?;
            apply_full_schema(&bootstrap_connection)
                .await
                .map_err(|e| DbError::ConnectionError(format!("schema bootstrap failed: {e}")))?;
        }

        Ok(Self { driver, _memory_anchor: anchor })
    }

    pub fn get_connection(&self) -> Result<Connection, DbError> {
        self.driver.connect().map_err(|e| {
            error!("⚠️ [DATABASE]: connection allocation failed: {}", e);
            DbError::ConnectionError(e.to_string())
        })
    }
}
