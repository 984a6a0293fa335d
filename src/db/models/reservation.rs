//! Guest reservations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor, SqlitePool};

use super::RoomRestriction;
use crate::db::timed;

/// A reservation row joined with its room's name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Reservation {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub room_id: i64,
    pub processed: i64,
    pub created_at: String,
    pub updated_at: String,
    pub room_name: Option<String>,
}

/// Guest contact details, as entered on the booking or admin edit form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuestDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Everything needed to write a reservation row
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub guest: GuestDetails,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub room_id: i64,
}

const SELECT_WITH_ROOM: &str = r#"
    SELECT r.id, r.first_name, r.last_name, r.email, r.phone, r.start_date, r.end_date,
           r.room_id, r.processed, r.created_at, r.updated_at, rm.room_name AS room_name
    FROM reservations r
    LEFT JOIN rooms rm ON r.room_id = rm.id
"#;

impl Reservation {
    pub fn is_processed(&self) -> bool {
        self.processed != 0
    }

    pub fn guest(&self) -> GuestDetails {
        GuestDetails {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }

    pub async fn insert<'e, E>(executor: E, new: &NewReservation) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let now = chrono::Utc::now().to_rfc3339();
        let result = timed(
            sqlx::query(
                r#"
                INSERT INTO reservations
                    (first_name, last_name, email, phone, start_date, end_date, room_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&new.guest.first_name)
            .bind(&new.guest.last_name)
            .bind(&new.guest.email)
            .bind(&new.guest.phone)
            .bind(new.start_date)
            .bind(new.end_date)
            .bind(new.room_id)
            .bind(&now)
            .bind(&now)
            .execute(executor),
        )
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find(db: &SqlitePool, id: i64) -> Result<Option<Reservation>, sqlx::Error> {
        let sql = format!("{SELECT_WITH_ROOM} WHERE r.id = ?");
        timed(
            sqlx::query_as::<_, Reservation>(&sql)
                .bind(id)
                .fetch_optional(db),
        )
        .await
    }

    pub async fn list_all(db: &SqlitePool) -> Result<Vec<Reservation>, sqlx::Error> {
        let sql = format!("{SELECT_WITH_ROOM} ORDER BY r.start_date ASC, r.id ASC");
        timed(sqlx::query_as::<_, Reservation>(&sql).fetch_all(db)).await
    }

    /// Reservations the admin has not marked processed yet
    pub async fn list_unprocessed(db: &SqlitePool) -> Result<Vec<Reservation>, sqlx::Error> {
        let sql = format!(
            "{SELECT_WITH_ROOM} WHERE r.processed = 0 ORDER BY r.start_date ASC, r.id ASC"
        );
        timed(sqlx::query_as::<_, Reservation>(&sql).fetch_all(db)).await
    }

    pub async fn update_guest(
        db: &SqlitePool,
        id: i64,
        guest: &GuestDetails,
    ) -> Result<bool, sqlx::Error> {
        let result = timed(
            sqlx::query(
                r#"
                UPDATE reservations SET first_name = ?, last_name = ?, email = ?, phone = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&guest.first_name)
            .bind(&guest.last_name)
            .bind(&guest.email)
            .bind(&guest.phone)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id)
            .execute(db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_processed(
        db: &SqlitePool,
        id: i64,
        processed: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = timed(
            sqlx::query("UPDATE reservations SET processed = ?, updated_at = ? WHERE id = ?")
                .bind(if processed { 1 } else { 0 })
                .bind(chrono::Utc::now().to_rfc3339())
                .bind(id)
                .execute(db),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes the reservation together with its restriction rows.
    pub async fn delete(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = db.begin().await?;

        RoomRestriction::delete_for_reservation(&mut *tx, id).await?;
        let result = timed(
            sqlx::query("DELETE FROM reservations WHERE id = ?")
                .bind(id)
                .execute(&mut *tx),
        )
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
