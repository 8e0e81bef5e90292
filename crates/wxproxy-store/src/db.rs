//! SQLite connection handling: an r2d2 pool, a per-call direct
//! connection, or nothing at all when no DSN is configured.
//!
//! All SQLite work runs on the blocking thread pool. Pooled connections go
//! back to the pool when the closure finishes, whether it succeeded,
//! failed, or panicked.

use std::time::{Duration, Instant};

use r2d2::{HandleError, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::Serialize;
use wxproxy_core::{DatabaseError, RusqliteErrorExt, Settings};

/// How long SQLite waits on a locked database before failing a statement.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const TABLE_NAME: &str = "weather_api_response";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS weather_api_response (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location TEXT NOT NULL,
    api_type TEXT NOT NULL,
    json_data TEXT NOT NULL,
    params_json TEXT,
    response_time_ms INTEGER,
    status_code INTEGER,
    request_url TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_weather_api_response_api_type
    ON weather_api_response(api_type, created_at);
"#;

fn open_connection(dsn: &str) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(dsn).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(RusqliteErrorExt::into_database_error)?;
    Ok(conn)
}

/// Pool sizing and checkout policy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub dsn: String,
    pub min: u32,
    pub max: u32,
    /// Reported by `/health`; r2d2 opens connections one at a time.
    pub increment: u32,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub fn from_settings(dsn: &str, settings: &Settings) -> Self {
        Self {
            dsn: dsn.to_string(),
            min: settings.db_pool_min,
            max: settings.db_pool_max,
            increment: settings.db_pool_increment.max(1),
            acquire_timeout: settings.db_pool_timeout(),
        }
    }
}

/// Routes r2d2's background connection errors into our logs.
#[derive(Debug)]
struct LogConnectionErrors;

impl HandleError<rusqlite::Error> for LogConnectionErrors {
    fn handle_error(&self, error: rusqlite::Error) {
        tracing::warn!("Pooled connection failed: {}", error);
    }
}

/// Bounded pool of SQLite connections.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool<SqliteConnectionManager>,
    config: PoolConfig,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("ConnectionPool")
            .field("max", &self.config.max)
            .field("opened", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

impl ConnectionPool {
    /// Create the pool and open `min` connections up front.
    ///
    /// Blocks for up to the acquire timeout, and fails if the initial
    /// connections cannot be opened within it.
    pub fn new(config: PoolConfig) -> Result<Self, DatabaseError> {
        if config.max == 0 {
            return Err(DatabaseError::ConnectionFailed(
                "pool max must be at least 1".into(),
            ));
        }
        let min = config.min.min(config.max);
        let manager = SqliteConnectionManager::file(&config.dsn)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));

        let pool = Pool::builder()
            .min_idle(Some(min))
            .max_size(config.max)
            .connection_timeout(config.acquire_timeout)
            .error_handler(Box::new(LogConnectionErrors))
            .build(manager)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        tracing::info!(min, max = config.max, "Connection pool created");
        Ok(Self { pool, config })
    }

    /// Run `f` on a pooled connection. Call from a blocking thread.
    fn run<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let started = Instant::now();
        let mut conn = self.pool.get().map_err(|e| {
            tracing::warn!("Connection checkout failed: {}", e);
            DatabaseError::PoolExhausted {
                max: self.config.max,
                waited_ms: started.elapsed().as_millis() as u64,
            }
        })?;
        f(&mut conn)
    }

    pub fn info(&self) -> PoolInfo {
        let state = self.pool.state();
        PoolInfo {
            pool_initialized: true,
            mode: "pooled",
            min: Some(self.config.min),
            max: Some(self.config.max),
            increment: Some(self.config.increment),
            opened: Some(state.connections),
            busy: Some(state.connections.saturating_sub(state.idle_connections)),
        }
    }
}

/// Pool sizing as reported by `/health`. Never carries the DSN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    pub pool_initialized: bool,
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy: Option<u32>,
}

impl PoolInfo {
    fn without_pool(mode: &'static str) -> Self {
        Self {
            pool_initialized: false,
            mode,
            min: None,
            max: None,
            increment: None,
            opened: None,
            busy: None,
        }
    }
}

/// Database handle shared by the whole service.
#[derive(Debug, Clone)]
pub enum Database {
    Pooled(ConnectionPool),
    /// A fresh connection per call, closed when the call finishes
    Direct { dsn: String },
    Unconfigured,
}

impl Database {
    /// Build the handle from settings.
    ///
    /// No DSN gives [`Database::Unconfigured`]. A pool max of 0 selects direct
    /// connections, and so does a pool that fails to start.
    pub fn from_settings(settings: &Settings) -> Self {
        let dsn = match settings.db_dsn.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(dsn) => dsn,
            None => {
                tracing::warn!("DB_DSN is not set; call records will not be persisted");
                return Self::Unconfigured;
            }
        };

        if settings.db_pool_max == 0 {
            tracing::info!("Connection pool disabled, using direct connections");
            return Self::Direct { dsn: dsn.to_string() };
        }

        match ConnectionPool::new(PoolConfig::from_settings(dsn, settings)) {
            Ok(pool) => Self::Pooled(pool),
            Err(e) => {
                tracing::error!("Failed to create connection pool, falling back to direct connections: {}", e);
                Self::Direct { dsn: dsn.to_string() }
            }
        }
    }

    /// Run `f` with a connection on the blocking thread pool.
    pub async fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DatabaseError> + Send + 'static,
    {
        let result = match self {
            Self::Pooled(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || pool.run(f)).await
            }
            Self::Direct { dsn } => {
                let dsn = dsn.clone();
                tokio::task::spawn_blocking(move || {
                    let mut conn = open_connection(&dsn)?;
                    f(&mut conn)
                })
                .await
            }
            Self::Unconfigured => return Err(DatabaseError::NotConfigured.into()),
        };

        result.map_err(|e| E::from(DatabaseError::QueryFailed(format!("database task failed: {}", e))))?
    }

    /// Create the call record table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        self.with_connection(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(RusqliteErrorExt::into_database_error)
        })
        .await
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(RusqliteErrorExt::into_database_error)
        })
        .await
    }

    pub fn pool_info(&self) -> PoolInfo {
        match self {
            Self::Pooled(pool) => pool.info(),
            Self::Direct { .. } => PoolInfo::without_pool("direct"),
            Self::Unconfigured => PoolInfo::without_pool("unconfigured"),
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Unconfigured)
    }
}
