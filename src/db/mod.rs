mod models;
mod seeders;

pub use models::*;
pub use seeders::{ensure_admin_user, seed_rooms};

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

/// Upper bound for a single query or statement
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Run a query future, aborting it once `QUERY_TIMEOUT` elapses.
///
/// A timeout surfaces as `sqlx::Error::Io` with `ErrorKind::TimedOut`, so callers
/// handle it on the same path as any other storage failure.
pub async fn timed<T, F>(fut: F) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "query timed out",
        ))),
    }
}

/// Split a migration into statements. Comment lines are dropped first so a
/// `;` inside a comment never ends a statement.
fn migration_statements(sql: &str) -> Vec<String> {
    let cleaned = sql
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in migration_statements(sql) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    info!(url = %config.url, "Initializing database");
    ensure_parent_dir(&config.url)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .max_lifetime(config.max_lifetime())
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;
    seeders::seed_rooms(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Create the directory holding a file-backed database
fn ensure_parent_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: rooms, reservations, restrictions, users, todo list
    let has_rooms_table: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name='rooms'")
            .fetch_optional(pool)
            .await?;
    if has_rooms_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;
    }

    // Migration 002: sessions
    let has_sessions_table: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name='sessions'")
            .fetch_optional(pool)
            .await?;
    if has_sessions_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_sessions.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

/// Fresh in-memory database with the full schema, for tests.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    // A single connection keeps every query on the same in-memory database
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        for table in ["reservations", "room_restrictions", "rooms", "sessions", "todo_list", "users"] {
            assert!(names.iter().any(|n| n == table), "missing table {}", table);
        }
    }

    #[test]
    fn test_semicolon_in_comment_does_not_split_statement() {
        let sql = "-- Notes; more notes\nCREATE TABLE a (id INTEGER);\n\n-- trailing; comment\nCREATE INDEX i ON a(id)";
        assert_eq!(
            migration_statements(sql),
            vec!["CREATE TABLE a (id INTEGER)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[tokio::test]
    async fn test_init_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bookings.db");
        let config = DatabaseConfig {
            url: format!("sqlite:{}?mode=rwc", path.display()),
            max_connections: 2,
            min_connections: 1,
            ..Default::default()
        };

        let pool = init(&config).await.unwrap();
        assert!(path.exists());

        let rooms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rooms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rooms, 2);

        let sessions: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='sessions'",
        )
        .fetch_optional(&pool)
        .await
        .unwrap();
        assert!(sessions.is_some());
        pool.close().await;
    }

    #[test]
    fn test_memory_database_needs_no_directory() {
        assert!(ensure_parent_dir("sqlite::memory:").is_ok());
        assert!(ensure_parent_dir("sqlite://:memory:?cache=shared").is_ok());
    }
}
