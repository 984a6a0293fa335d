// Guest booking flow: search, pick a room, enter details, see the summary

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::templates::{
    AvailableRoomsTemplate, MakeReservationTemplate, PageMeta, ReservationSummaryTemplate,
    SearchTemplate,
};
use super::{render_template, verify_csrf, WebError};
use crate::booking::{self, BookingError, ReservationForm};
use crate::db::{GuestDetails, Room};
use crate::session::{PendingReservation, ReservationSummary, Session};
use crate::validation::{parse_date, parse_positive_id, FormErrors};
use crate::AppState;

const NO_RESERVATION: &str = "Can't get reservation from session. Please select an available room.";

fn parse_range(start: &str, end: &str) -> Option<(NaiveDate, NaiveDate)> {
    let start = parse_date(start).ok()?;
    let end = parse_date(end).ok()?;
    (start <= end).then_some((start, end))
}

pub async fn search_page(session: Session) -> Response {
    render_template(SearchTemplate {
        meta: PageMeta::from_session(&session),
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

pub async fn search_submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<SearchForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;

    let Some((start_date, end_date)) = parse_range(&form.start, &form.end) else {
        session.put_error("Please enter a valid arrival and departure date");
        return Ok(Redirect::to("/reservation").into_response());
    };

    let rooms = booking::list_available_rooms(&state.db, start_date, end_date).await?;
    tracing::debug!(start = %start_date, end = %end_date, available = rooms.len(), "Availability search");

    if rooms.is_empty() {
        session.put_error("No available rooms on the dates selected");
        return Ok(Redirect::to("/reservation").into_response());
    }

    session.set_reservation(PendingReservation {
        start_date,
        end_date,
        room_id: None,
        room_name: None,
    });

    Ok(render_template(AvailableRoomsTemplate {
        meta: PageMeta::from_session(&session),
        rooms,
        start_date,
        end_date,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityForm {
    #[serde(default)]
    csrf_token: String,
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
    #[serde(default)]
    room_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityResponse {
    pub ok: bool,
    pub message: String,
    pub start_date: String,
    pub end_date: String,
    pub room_id: String,
}

impl AvailabilityResponse {
    fn failed(message: &str) -> Json<Self> {
        Json(Self {
            ok: false,
            message: message.to_string(),
            start_date: String::new(),
            end_date: String::new(),
            room_id: String::new(),
        })
    }
}

/// Availability of a single room, used by the room page
pub async fn availability_json(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<AvailabilityForm>,
) -> Result<Json<AvailabilityResponse>, WebError> {
    verify_csrf(&session, &form.csrf_token)?;

    let (Some((start, end)), Ok(room_id)) =
        (parse_range(&form.start, &form.end), parse_positive_id(&form.room_id))
    else {
        return Ok(AvailabilityResponse::failed("Invalid dates or room"));
    };

    match booking::is_room_available(&state.db, room_id, start, end).await {
        Ok(available) => Ok(Json(AvailabilityResponse {
            ok: available,
            message: if available {
                String::new()
            } else {
                "Not available for the selected dates".to_string()
            },
            start_date: start.to_string(),
            end_date: end.to_string(),
            room_id: room_id.to_string(),
        })),
        Err(e) => {
            tracing::error!(error = %e, room_id = room_id, "Availability check failed");
            Ok(AvailabilityResponse::failed("Error connecting to the database"))
        }
    }
}

/// Room picked from the search results
pub async fn choose_room(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let Ok(room_id) = parse_positive_id(&id) else {
        session.put_error("Missing room in the link");
        return Ok(Redirect::to("/").into_response());
    };
    let Some(mut pending) = session.reservation() else {
        session.put_error(NO_RESERVATION);
        return Ok(Redirect::to("/").into_response());
    };
    let Some(room) = Room::find(&state.db, room_id).await? else {
        session.put_error("Can't find room");
        return Ok(Redirect::to("/").into_response());
    };

    pending.room_id = Some(room.id);
    pending.room_name = Some(room.room_name);
    session.set_reservation(pending);

    Ok(Redirect::to("/make-reservation").into_response())
}

#[derive(Debug, Deserialize)]
pub struct BookRoomQuery {
    #[serde(default)]
    id: String,
    #[serde(default)]
    sd: String,
    #[serde(default)]
    ed: String,
}

/// Direct booking link from the room page
pub async fn book_room(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<BookRoomQuery>,
) -> Result<Response, WebError> {
    let (Some((start_date, end_date)), Ok(room_id)) =
        (parse_range(&query.sd, &query.ed), parse_positive_id(&query.id))
    else {
        session.put_error("Invalid booking link");
        return Ok(Redirect::to("/").into_response());
    };
    let Some(room) = Room::find(&state.db, room_id).await? else {
        session.put_error("Can't find room");
        return Ok(Redirect::to("/").into_response());
    };

    session.set_reservation(PendingReservation {
        start_date,
        end_date,
        room_id: Some(room.id),
        room_name: Some(room.room_name),
    });

    Ok(Redirect::to("/make-reservation").into_response())
}

// A pending reservation is only usable once a room was picked
fn pending_with_room(session: &Session) -> Option<(PendingReservation, i64)> {
    let pending = session.reservation()?;
    let room_id = pending.room_id?;
    Some((pending, room_id))
}

pub async fn make_reservation_page(session: Session) -> Response {
    let Some((pending, _)) = pending_with_room(&session) else {
        session.put_error(NO_RESERVATION);
        return Redirect::to("/").into_response();
    };

    render_template(MakeReservationTemplate {
        meta: PageMeta::from_session(&session),
        room_name: pending.room_name.clone().unwrap_or_default(),
        pending,
        guest: GuestDetails::default(),
        errors: FormErrors::new(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GuestForm {
    pub csrf_token: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl GuestForm {
    pub fn guest(&self) -> GuestDetails {
        GuestDetails {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
        }
    }
}

pub async fn make_reservation_submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<GuestForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;

    let Some((pending, room_id)) = pending_with_room(&session) else {
        session.put_error(NO_RESERVATION);
        return Ok(Redirect::to("/").into_response());
    };

    let input = ReservationForm {
        first_name: form.first_name.clone(),
        last_name: form.last_name.clone(),
        email: form.email.clone(),
        phone: form.phone.clone(),
        start_date: pending.start_date.to_string(),
        end_date: pending.end_date.to_string(),
        room_id: room_id.to_string(),
    };

    match booking::submit_reservation(&state.db, &state.mail, &state.config.mail, &input).await {
        Ok(reservation_id) => {
            session.clear_reservation();
            session.set_summary(ReservationSummary {
                reservation_id,
                guest: input.guest(),
                start_date: pending.start_date,
                end_date: pending.end_date,
                room_name: pending.room_name.unwrap_or_default(),
            });
            Ok(Redirect::to("/reservation-summary").into_response())
        }
        Err(BookingError::Validation(errors)) => {
            session.put_error("Invalid form input");
            Ok(render_template(MakeReservationTemplate {
                meta: PageMeta::from_session(&session),
                room_name: pending.room_name.clone().unwrap_or_default(),
                pending,
                guest: form.guest(),
                errors,
            }))
        }
        Err(BookingError::RoomUnavailable) => {
            session.clear_reservation();
            session.put_error("Sorry, the room was just booked for those dates. Please search again.");
            Ok(Redirect::to("/reservation").into_response())
        }
        Err(BookingError::Storage(e)) => {
            tracing::error!(error = %e, "Failed to store reservation");
            session.put_error("Can't save the reservation right now. Please try again.");
            Ok(Redirect::to("/").into_response())
        }
    }
}

pub async fn reservation_summary(session: Session) -> Response {
    let Some(summary) = session.take_summary() else {
        tracing::warn!("Reservation summary requested without a booking in session");
        session.put_error(NO_RESERVATION);
        return Redirect::to("/").into_response();
    };

    render_template(ReservationSummaryTemplate {
        meta: PageMeta::from_session(&session),
        summary,
    })
}
