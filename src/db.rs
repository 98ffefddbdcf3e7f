use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, DbBackend,
    DbErr, IsolationLevel, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::info;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut opts = ConnectOptions::new(config.url.clone());
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(true);

    let pool = Database::connect(opts).await.map_err(|e| {
        ServiceError::InternalError(format!("Failed to connect to database: {}", e))
    })?;

    info!("Database connection established");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DbPool, ServiceError> {
    establish_connection(&cfg.database_url).await
}

/// Attempts made on a count-then-insert transaction before a serialization
/// loss propagates to the caller.
pub const SERIALIZATION_RETRIES: u32 = 3;

/// Opens a transaction at SERIALIZABLE isolation. SQLite transactions are
/// serializable already and the driver rejects an explicit level, so the
/// plain begin is used there.
pub async fn begin_serializable(
    db: &DatabaseConnection,
) -> Result<DatabaseTransaction, DbErr> {
    match db.get_database_backend() {
        DbBackend::Sqlite => db.begin().await,
        _ => {
            db.begin_with_config(Some(IsolationLevel::Serializable), None)
                .await
        }
    }
}

/// True when the backend aborted the transaction because it could not
/// serialize it against a concurrent writer (SQLSTATE 40001). The whole
/// transaction rolled back, so a retry from the top is safe.
pub fn is_serialization_failure(err: &ServiceError) -> bool {
    match err {
        ServiceError::DatabaseError(db_err) => {
            let msg = db_err.to_string();
            msg.contains("40001") || msg.contains("could not serialize access")
        }
        _ => false,
    }
}

/// Applies all pending migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::InternalError(format!("Migration failed: {}", e)))?;
    info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_failures_are_retryable() {
        let aborted = ServiceError::DatabaseError(DbErr::Custom(
            "could not serialize access due to concurrent update".to_string(),
        ));
        assert!(is_serialization_failure(&aborted));

        let by_code = ServiceError::DatabaseError(DbErr::Custom(
            "error returned from database: SQLSTATE 40001".to_string(),
        ));
        assert!(is_serialization_failure(&by_code));

        let unrelated = ServiceError::DatabaseError(DbErr::Custom(
            "duplicate key value violates unique constraint".to_string(),
        ));
        assert!(!is_serialization_failure(&unrelated));
        assert!(!is_serialization_failure(&ServiceError::ValidationError(
            "end must be after start".to_string()
        )));
    }

    #[tokio::test]
    async fn begin_serializable_on_sqlite() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let txn = begin_serializable(&db).await.unwrap();
        txn.rollback().await.unwrap();
    }
}
