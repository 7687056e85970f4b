//! Database module: connection management, migrations and the layout store.

pub mod layouts;

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;

pub use layouts::SeaOrmLayoutStore;

/// Shared PostgreSQL connection pool.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using `DATABASE_URL`.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        if !config.database_url.starts_with("postgres://")
            && !config.database_url.starts_with("postgresql://")
        {
            return Err(AppError::Database(
                "Invalid DATABASE_URL format. Expected 'postgres://...'".to_string(),
            ));
        }

        let mut options = ConnectOptions::new(config.database_url.clone());
        options
            .max_connections(16)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        DbPool { conn }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> AppResult<()> {
        let stmt = Statement::from_string(self.conn.get_database_backend(), "SELECT 1".to_owned());
        self.conn.query_one_raw(stmt).await?;
        Ok(())
    }
}
