//! Admin users.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::timed;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub access_level: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
        timed(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(db),
        )
        .await
    }

    pub async fn insert(
        db: &SqlitePool,
        name: &str,
        email: &str,
        password_hash: &str,
        access_level: i64,
    ) -> Result<i64, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = timed(
            sqlx::query(
                r#"
                INSERT INTO users (name, email, password_hash, access_level, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(email)
            .bind(password_hash)
            .bind(access_level)
            .bind(&now)
            .bind(&now)
            .execute(db),
        )
        .await?;

        Ok(result.last_insert_rowid())
    }
}
