//! Which rooms are free for a date range.
//!
//! A restriction blocks a request for `[start, end]` when
//! `restriction.start_date <= end AND restriction.end_date >= start`.
//! Both ends are inclusive, so a stay ending on a day blocks a stay starting on it.

use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::db::{timed, Room, RoomRestriction};

pub async fn is_room_available(
    db: &SqlitePool,
    room_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<bool, sqlx::Error> {
    let blocking = RoomRestriction::count_overlapping(db, room_id, start, end).await?;
    Ok(blocking == 0)
}

/// Rooms with no overlapping restriction, ordered by name then id
pub async fn list_available_rooms(
    db: &SqlitePool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Room>, sqlx::Error> {
    timed(
        sqlx::query_as::<_, Room>(
            r#"
            SELECT r.* FROM rooms r
            WHERE r.id NOT IN (
                SELECT rr.room_id FROM room_restrictions rr
                WHERE rr.start_date <= ? AND rr.end_date >= ?
            )
            ORDER BY r.room_name, r.id
            "#,
        )
        .bind(end)
        .bind(start)
        .fetch_all(db),
    )
    .await
}
