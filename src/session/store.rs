use chrono::{SecondsFormat, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::time::{interval, Duration};

use super::SessionData;
use crate::config::SessionConfig;
use crate::db::timed;

/// Generate a random session token
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

// Fixed-width UTC stamps so expiry can be compared as text
fn stamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Session rows keyed by token hash
#[derive(Clone)]
pub struct SessionStore {
    db: SqlitePool,
    lifetime: chrono::Duration,
}

impl SessionStore {
    pub fn new(db: SqlitePool, config: &SessionConfig) -> Self {
        Self {
            db,
            lifetime: chrono::Duration::hours(config.lifetime_hours),
        }
    }

    /// Returns None for unknown, expired or unreadable sessions
    pub async fn load(&self, token: &str) -> Result<Option<SessionData>, sqlx::Error> {
        let row: Option<(String,)> = timed(
            sqlx::query_as("SELECT data FROM sessions WHERE token_hash = ? AND expires_at > ?")
                .bind(hash_token(token))
                .bind(stamp(Utc::now()))
                .fetch_optional(&self.db),
        )
        .await?;

        Ok(row.and_then(|(data,)| match serde_json::from_str(&data) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session data");
                None
            }
        }))
    }

    /// Insert or replace the session and push its expiry forward
    pub async fn save(&self, token: &str, data: &SessionData) -> Result<(), sqlx::Error> {
        let json = serde_json::to_string(data).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let now = Utc::now();

        timed(
            sqlx::query(
                r#"
                INSERT INTO sessions (token_hash, data, expires_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(token_hash) DO UPDATE SET
                    data = excluded.data,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(hash_token(token))
            .bind(&json)
            .bind(stamp(now + self.lifetime))
            .bind(stamp(now))
            .bind(stamp(now))
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    pub async fn delete(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = timed(
            sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
                .bind(hash_token(token))
                .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let result = timed(
            sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(stamp(Utc::now()))
                .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected())
    }
}

/// Spawn the background task that removes expired sessions
pub fn spawn_cleanup_task(store: SessionStore, interval_secs: u64) {
    tracing::info!(interval_secs = interval_secs, "Starting session cleanup task");

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed = removed, "Purged expired sessions"),
                Err(e) => tracing::error!(error = %e, "Session cleanup failed"),
            }
        }
    });
}
