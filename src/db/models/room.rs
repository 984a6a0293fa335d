//! Room catalog.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::db::timed;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Room {
    pub id: i64,
    pub room_name: String,
    /// Decimal amount kept as text, e.g. "89.00"
    pub price: String,
    pub image_src: String,
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields an admin supplies when creating or editing a room
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomInput {
    pub room_name: String,
    pub price: String,
    pub image_src: String,
    pub description: String,
}

impl Room {
    pub async fn list_all(db: &SqlitePool) -> Result<Vec<Room>, sqlx::Error> {
        timed(
            sqlx::query_as::<_, Room>("SELECT * FROM rooms ORDER BY room_name, id").fetch_all(db),
        )
        .await
    }

    pub async fn find(db: &SqlitePool, id: i64) -> Result<Option<Room>, sqlx::Error> {
        timed(
            sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
                .bind(id)
                .fetch_optional(db),
        )
        .await
    }

    pub async fn insert(db: &SqlitePool, input: &RoomInput) -> Result<i64, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = timed(
            sqlx::query(
                r#"
                INSERT INTO rooms (room_name, price, image_src, description, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.room_name)
            .bind(&input.price)
            .bind(&input.image_src)
            .bind(&input.description)
            .bind(&now)
            .bind(&now)
            .execute(db),
        )
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Returns false when no room has that id
    pub async fn update(db: &SqlitePool, id: i64, input: &RoomInput) -> Result<bool, sqlx::Error> {
        let result = timed(
            sqlx::query(
                r#"
                UPDATE rooms SET room_name = ?, price = ?, image_src = ?, description = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.room_name)
            .bind(&input.price)
            .bind(&input.image_src)
            .bind(&input.description)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deleting a room still referenced by a reservation or restriction fails
    /// with a foreign key violation.
    pub async fn delete(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = timed(sqlx::query("DELETE FROM rooms WHERE id = ?").bind(id).execute(db)).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn input(name: &str) -> RoomInput {
        RoomInput {
            room_name: name.to_string(),
            price: "120.00".to_string(),
            image_src: "/static/images/room.png".to_string(),
            description: "A quiet room".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rooms_listed_by_name() {
        let db = test_pool().await;
        Room::insert(&db, &input("Major's Suite")).await.unwrap();
        Room::insert(&db, &input("General's Quarters")).await.unwrap();

        let rooms = Room::list_all(&db).await.unwrap();
        let names: Vec<_> = rooms.iter().map(|r| r.room_name.as_str()).collect();
        assert_eq!(names, vec!["General's Quarters", "Major's Suite"]);
    }

    #[tokio::test]
    async fn test_update_and_find() {
        let db = test_pool().await;
        let id = Room::insert(&db, &input("Garden Room")).await.unwrap();

        let mut changed = input("Garden Room Deluxe");
        changed.price = "150.50".to_string();
        assert!(Room::update(&db, id, &changed).await.unwrap());

        let room = Room::find(&db, id).await.unwrap().unwrap();
        assert_eq!(room.room_name, "Garden Room Deluxe");
        assert_eq!(room.price, "150.50");

        assert!(!Room::update(&db, id + 100, &changed).await.unwrap());
        assert!(Room::find(&db, id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_unreferenced_room() {
        let db = test_pool().await;
        let id = Room::insert(&db, &input("Attic")).await.unwrap();
        assert!(Room::delete(&db, id).await.unwrap());
        assert!(Room::find(&db, id).await.unwrap().is_none());
    }
}
