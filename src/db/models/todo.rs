use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::timed;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TodoItem {
    pub id: i64,
    pub todo: String,
    pub user_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TodoItem {
    pub async fn list_for_user(db: &SqlitePool, user_id: i64) -> Result<Vec<TodoItem>, sqlx::Error> {
        timed(
            sqlx::query_as::<_, TodoItem>(
                "SELECT * FROM todo_list WHERE user_id = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(user_id)
            .fetch_all(db),
        )
        .await
    }

    pub async fn insert(db: &SqlitePool, user_id: i64, todo: &str) -> Result<i64, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = timed(
            sqlx::query(
                "INSERT INTO todo_list (todo, user_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(todo)
            .bind(user_id)
            .bind(&now)
            .bind(&now)
            .execute(db),
        )
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Only the owner's items can be deleted
    pub async fn delete(db: &SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = timed(
            sqlx::query("DELETE FROM todo_list WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
