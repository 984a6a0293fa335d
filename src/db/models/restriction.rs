//! Room restrictions: inclusive date intervals during which a room cannot be booked.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};

use crate::db::timed;

/// Why a room is unavailable. Stored as the `restriction_id` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestrictionKind {
    Reservation,
    Block,
}

impl RestrictionKind {
    pub fn id(&self) -> i64 {
        match self {
            Self::Reservation => 1,
            Self::Block => 2,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Reservation),
            2 => Some(Self::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct RoomRestriction {
    pub id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub room_id: i64,
    /// None for a manual block
    pub reservation_id: Option<i64>,
    pub restriction_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl RoomRestriction {
    pub fn kind(&self) -> Option<RestrictionKind> {
        RestrictionKind::from_id(self.restriction_id)
    }

    pub fn is_block(&self) -> bool {
        self.reservation_id.is_none()
    }

    /// Inclusive on both ends: touching intervals overlap.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }

    pub async fn insert<'e, E>(
        executor: E,
        room_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        reservation_id: Option<i64>,
        kind: RestrictionKind,
    ) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let now = chrono::Utc::now().to_rfc3339();
        let result = timed(
            sqlx::query(
                r#"
                INSERT INTO room_restrictions
                    (start_date, end_date, room_id, reservation_id, restriction_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(start)
            .bind(end)
            .bind(room_id)
            .bind(reservation_id)
            .bind(kind.id())
            .bind(&now)
            .bind(&now)
            .execute(executor),
        )
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Single-day manual block
    pub async fn insert_block(
        db: &SqlitePool,
        room_id: i64,
        day: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        Self::insert(db, room_id, day, day, None, RestrictionKind::Block).await
    }

    /// Deletes a manual block. Reservation-derived rows are never touched here.
    pub async fn delete_block(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = timed(
            sqlx::query("DELETE FROM room_restrictions WHERE id = ? AND reservation_id IS NULL")
                .bind(id)
                .execute(db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_reservation<'e, E>(
        executor: E,
        reservation_id: i64,
    ) -> Result<u64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = timed(
            sqlx::query("DELETE FROM room_restrictions WHERE reservation_id = ?")
                .bind(reservation_id)
                .execute(executor),
        )
        .await?;

        Ok(result.rows_affected())
    }

    /// Number of restrictions on `room_id` overlapping `[start, end]`
    pub async fn count_overlapping<'e, E>(
        executor: E,
        room_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        timed(
            sqlx::query_scalar(
                r#"
                SELECT COUNT(id) FROM room_restrictions
                WHERE room_id = ? AND start_date <= ? AND end_date >= ?
                "#,
            )
            .bind(room_id)
            .bind(end)
            .bind(start)
            .fetch_one(executor),
        )
        .await
    }

    /// Every restriction, across all rooms, overlapping `[start, end]`
    pub async fn overlapping(
        db: &SqlitePool,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RoomRestriction>, sqlx::Error> {
        timed(
            sqlx::query_as::<_, RoomRestriction>(
                r#"
                SELECT * FROM room_restrictions
                WHERE start_date <= ? AND end_date >= ?
                ORDER BY room_id, start_date, id
                "#,
            )
            .bind(end)
            .bind(start)
            .fetch_all(db),
        )
        .await
    }

    pub async fn for_reservation(
        db: &SqlitePool,
        reservation_id: i64,
    ) -> Result<Vec<RoomRestriction>, sqlx::Error> {
        timed(
            sqlx::query_as::<_, RoomRestriction>(
                "SELECT * FROM room_restrictions WHERE reservation_id = ? ORDER BY id",
            )
            .bind(reservation_id)
            .fetch_all(db),
        )
        .await
    }
}
