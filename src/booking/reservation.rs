//! Guest booking: validate the form, then write the reservation and its
//! restriction in one transaction.

use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::MailConfig;
use crate::db::{GuestDetails, NewReservation, Reservation, RestrictionKind, Room, RoomRestriction};
use crate::mail::{messages, MailQueue};
use crate::validation::{
    parse_date, parse_positive_id, validate_email, validate_length, validate_required, FormErrors,
};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    Validation(FormErrors),
    /// Another booking or block took the room after it was offered
    #[error("room is no longer available for the selected dates")]
    RoomUnavailable,
    #[error("cannot persist reservation: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Raw booking input. Dates and room id are still text at this point.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReservationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub start_date: String,
    pub end_date: String,
    pub room_id: String,
}

impl ReservationForm {
    pub fn guest(&self) -> GuestDetails {
        GuestDetails {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
        }
    }
}

/// Guest field rules, shared with the admin edit form
pub fn validate_guest(guest: &GuestDetails, errors: &mut FormErrors) {
    for (field, value) in [
        ("first_name", &guest.first_name),
        ("last_name", &guest.last_name),
        ("email", &guest.email),
        ("phone", &guest.phone),
    ] {
        errors.check(field, validate_required(value));
    }

    if !errors.has("first_name") {
        errors.check("first_name", validate_length(&guest.first_name, 3, 30));
    }
    if !errors.has("last_name") {
        errors.check("last_name", validate_length(&guest.last_name, 3, 30));
    }
    if !errors.has("email") {
        errors.check("email", validate_email(&guest.email));
    }
}

async fn validate(db: &SqlitePool, form: &ReservationForm) -> Result<(NewReservation, Room), BookingError> {
    let mut errors = FormErrors::new();
    let guest = form.guest();
    validate_guest(&guest, &mut errors);

    let mut date_field = |field: &str, value: &str| match parse_date(value) {
        Ok(date) => Some(date),
        Err(e) => {
            errors.add(field, e);
            None
        }
    };
    let start_date = date_field("start_date", &form.start_date);
    let end_date = date_field("end_date", &form.end_date);
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            errors.add("end_date", "Departure must not be before arrival");
        }
    }

    let mut room = None;
    match parse_positive_id(&form.room_id) {
        Ok(room_id) => {
            room = Room::find(db, room_id).await?;
            if room.is_none() {
                errors.add("room_id", "Unknown room");
            }
        }
        Err(e) => {
            errors.add("room_id", e);
        }
    }

    errors.finish().map_err(BookingError::Validation)?;

    match (start_date, end_date, room) {
        (Some(start_date), Some(end_date), Some(room)) => Ok((
            NewReservation {
                guest,
                start_date,
                end_date,
                room_id: room.id,
            },
            room,
        )),
        // Every None above recorded a field error
        _ => Err(BookingError::Validation(FormErrors::new())),
    }
}

/// Validate and store a booking, then queue the guest confirmation and the
/// operations alert. Returns the new reservation id.
pub async fn submit_reservation(
    db: &SqlitePool,
    mail: &MailQueue,
    mail_config: &MailConfig,
    form: &ReservationForm,
) -> Result<i64, BookingError> {
    let (new, room) = validate(db, form).await?;

    let mut tx = db.begin().await?;

    let blocking =
        RoomRestriction::count_overlapping(&mut *tx, new.room_id, new.start_date, new.end_date).await?;
    if blocking > 0 {
        tracing::info!(
            room_id = new.room_id,
            start = %new.start_date,
            end = %new.end_date,
            "Booking rejected: room taken"
        );
        return Err(BookingError::RoomUnavailable);
    }

    let reservation_id = Reservation::insert(&mut *tx, &new).await?;
    RoomRestriction::insert(
        &mut *tx,
        new.room_id,
        new.start_date,
        new.end_date,
        Some(reservation_id),
        RestrictionKind::Reservation,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        reservation_id = reservation_id,
        room_id = new.room_id,
        start = %new.start_date,
        end = %new.end_date,
        "Reservation created"
    );

    for message in [
        messages::reservation_confirmation(mail_config, &new),
        messages::new_reservation_alert(mail_config, &new, &room.room_name),
    ] {
        if let Err(e) = mail.send(message) {
            tracing::warn!(error = %e, "Mail queue closed, notification dropped");
        }
    }

    Ok(reservation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::availability::is_room_available;
    use crate::db::{test_pool, RoomInput};
    use crate::mail;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    async fn room(db: &SqlitePool) -> i64 {
        Room::insert(
            db,
            &RoomInput {
                room_name: "General's Quarters".to_string(),
                price: "89.00".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    fn form(room_id: i64) -> ReservationForm {
        ReservationForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "555-0100".to_string(),
            start_date: "2050-01-01".to_string(),
            end_date: "2050-01-02".to_string(),
            room_id: room_id.to_string(),
        }
    }

    async fn reservation_count(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM reservations")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_booking_writes_both_rows_and_queues_mail() {
        let db = test_pool().await;
        let room_id = room(&db).await;
        let (tx, mut rx) = mail::channel();
        let config = MailConfig::default();

        let id = submit_reservation(&db, &tx, &config, &form(room_id)).await.unwrap();

        let stored = Reservation::find(&db, id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "Ada");
        assert_eq!(stored.start_date, date("2050-01-01"));

        let restrictions = RoomRestriction::for_reservation(&db, id).await.unwrap();
        assert_eq!(restrictions.len(), 1);
        assert_eq!(restrictions[0].kind(), Some(RestrictionKind::Reservation));
        assert_eq!(restrictions[0].end_date, date("2050-01-02"));

        let confirmation = rx.try_recv().unwrap();
        assert_eq!(confirmation.to, "ada@example.com");
        assert_eq!(confirmation.template.as_deref(), Some("basic.html"));
        let alert = rx.try_recv().unwrap();
        assert_eq!(alert.to, config.operations_address);
        assert!(alert.template.is_none());
        assert!(rx.try_recv().is_err());

        assert!(!is_room_available(&db, room_id, date("2050-01-02"), date("2050-01-05"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_short_first_name_is_rejected_without_writing() {
        let db = test_pool().await;
        let room_id = room(&db).await;
        let (tx, mut rx) = mail::channel();

        let mut input = form(room_id);
        input.first_name = "Al".to_string();

        let err = submit_reservation(&db, &tx, &MailConfig::default(), &input)
            .await
            .unwrap_err();
        match err {
            BookingError::Validation(errors) => {
                assert!(errors.has("first_name"));
                assert!(!errors.has("last_name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(reservation_count(&db).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_all_field_errors_are_reported_together() {
        let db = test_pool().await;
        let input = ReservationForm {
            first_name: " ".to_string(),
            last_name: "Lovelace".to_string(),
            email: "not-an-email".to_string(),
            phone: String::new(),
            start_date: "2050-01-05".to_string(),
            end_date: "2050-01-01".to_string(),
            room_id: "abc".to_string(),
        };
        let (tx, _rx) = mail::channel();

        let err = submit_reservation(&db, &tx, &MailConfig::default(), &input)
            .await
            .unwrap_err();
        let BookingError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(fields, vec!["email", "end_date", "first_name", "phone", "room_id"]);
    }

    #[tokio::test]
    async fn test_unknown_room_and_bad_dates_are_field_errors() {
        let db = test_pool().await;
        let mut input = form(42);
        input.start_date = "01/01/2050".to_string();
        let (tx, _rx) = mail::channel();

        let err = submit_reservation(&db, &tx, &MailConfig::default(), &input)
            .await
            .unwrap_err();
        let BookingError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.has("room_id"));
        assert!(errors.has("start_date"));
        assert_eq!(reservation_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_five_digit_year_is_a_field_error() {
        let db = test_pool().await;
        let room_id = room(&db).await;
        let mut input = form(room_id);
        input.start_date = "10000-01-01".to_string();
        input.end_date = "10000-01-02".to_string();
        let (tx, _rx) = mail::channel();

        let err = submit_reservation(&db, &tx, &MailConfig::default(), &input)
            .await
            .unwrap_err();
        let BookingError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.has("start_date"));
        assert!(errors.has("end_date"));
        assert_eq!(reservation_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_second_overlapping_booking_is_refused() {
        let db = test_pool().await;
        let room_id = room(&db).await;
        let (tx, _rx) = mail::channel();
        let config = MailConfig::default();

        submit_reservation(&db, &tx, &config, &form(room_id)).await.unwrap();

        let mut overlapping = form(room_id);
        overlapping.start_date = "2050-01-02".to_string();
        overlapping.end_date = "2050-01-04".to_string();
        let err = submit_reservation(&db, &tx, &config, &overlapping)
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::RoomUnavailable));
        assert_eq!(reservation_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_closed_mail_queue_does_not_fail_booking() {
        let db = test_pool().await;
        let room_id = room(&db).await;
        let (tx, rx) = mail::channel();
        drop(rx);

        let id = submit_reservation(&db, &tx, &MailConfig::default(), &form(room_id)).await;
        tokio_test::assert_ok!(id);
    }
}
