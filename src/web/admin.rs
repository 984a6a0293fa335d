// Admin back office: reservations, calendar, rooms, to-do list

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Datelike;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::templates::{
    CalendarTemplate, DashboardTemplate, PageMeta, ReservationTemplate, ReservationsTemplate,
    RoomFormTemplate, RoomsTemplate, TodoTemplate,
};
use super::{render_template, verify_csrf, WebError};
use crate::booking::{self, CalendarError, CalendarSubmission};
use crate::db::{GuestDetails, Reservation, Room, RoomInput, TodoItem};
use crate::session::Session;
use crate::validation::{parse_positive_id, validate_length, validate_required, FormErrors};
use crate::AppState;

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, WebError> {
    let new_reservations = Reservation::list_unprocessed(&state.db).await?.len();
    let all_reservations = Reservation::list_all(&state.db).await?.len();
    let rooms = Room::list_all(&state.db).await?.len();

    Ok(render_template(DashboardTemplate {
        meta: PageMeta::from_session(&session),
        new_reservations,
        all_reservations,
        rooms,
    }))
}

pub async fn reservations_new(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, WebError> {
    let reservations = Reservation::list_unprocessed(&state.db).await?;
    Ok(render_template(ReservationsTemplate {
        meta: PageMeta::from_session(&session),
        title: "New Reservations".to_string(),
        src: "new".to_string(),
        reservations,
    }))
}

pub async fn reservations_all(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, WebError> {
    let reservations = Reservation::list_all(&state.db).await?;
    Ok(render_template(ReservationsTemplate {
        meta: PageMeta::from_session(&session),
        title: "All Reservations".to_string(),
        src: "all".to_string(),
        reservations,
    }))
}

/// Page a reservation was opened from
fn parse_source(src: &str) -> Result<&'static str, WebError> {
    match src {
        "new" => Ok("new"),
        "all" => Ok("all"),
        "cal" => Ok("cal"),
        _ => Err(WebError::NotFound),
    }
}

/// Where to go after acting on a reservation
fn return_path(src: &str, year: &str, month: &str) -> String {
    match (year.parse::<i32>(), month.parse::<u32>()) {
        (Ok(year), Ok(month)) => format!("/admin/reservations-calendar?y={}&m={}", year, month),
        _ if src == "new" => "/admin/reservations-new".to_string(),
        _ => "/admin/reservations-all".to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReturnTo {
    y: String,
    m: String,
}

pub async fn reservation_detail(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((src, id)): Path<(String, String)>,
    Query(back): Query<ReturnTo>,
) -> Result<Response, WebError> {
    let src = parse_source(&src)?;
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;
    let reservation = Reservation::find(&state.db, id).await?.ok_or(WebError::NotFound)?;

    Ok(render_template(ReservationTemplate {
        meta: PageMeta::from_session(&session),
        src: src.to_string(),
        guest: reservation.guest(),
        reservation,
        errors: FormErrors::new(),
        year: back.y,
        month: back.m,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReservationEditForm {
    csrf_token: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    year: String,
    month: String,
}

pub async fn reservation_update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((src, id)): Path<(String, String)>,
    Form(form): Form<ReservationEditForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let src = parse_source(&src)?;
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;
    let reservation = Reservation::find(&state.db, id).await?.ok_or(WebError::NotFound)?;

    let guest = GuestDetails {
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
    };
    let mut errors = FormErrors::new();
    booking::validate_guest(&guest, &mut errors);

    if !errors.is_empty() {
        session.put_error("Invalid inputs");
        return Ok(render_template(ReservationTemplate {
            meta: PageMeta::from_session(&session),
            src: src.to_string(),
            reservation,
            guest,
            errors,
            year: form.year,
            month: form.month,
        }));
    }

    Reservation::update_guest(&state.db, id, &guest).await?;
    tracing::info!(reservation_id = id, "Reservation updated");
    session.put_flash("Reservation Updated");

    Ok(Redirect::to(&return_path(src, &form.year, &form.month)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReservationActionForm {
    csrf_token: String,
    year: String,
    month: String,
}

/// Flip the processed flag
pub async fn reservation_process(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((src, id)): Path<(String, String)>,
    Form(form): Form<ReservationActionForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let src = parse_source(&src)?;
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;
    let reservation = Reservation::find(&state.db, id).await?.ok_or(WebError::NotFound)?;

    let processed = !reservation.is_processed();
    Reservation::set_processed(&state.db, id, processed).await?;
    tracing::info!(reservation_id = id, processed = processed, "Reservation processed flag changed");

    if processed {
        session.put_flash("Reservation is now marked as processed");
    } else {
        session.put_flash("Reservation is now marked as not processed");
    }

    Ok(Redirect::to(&return_path(src, &form.year, &form.month)).into_response())
}

pub async fn reservation_delete(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path((src, id)): Path<(String, String)>,
    Form(form): Form<ReservationActionForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let src = parse_source(&src)?;
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;

    if Reservation::delete(&state.db, id).await? {
        tracing::info!(reservation_id = id, "Reservation deleted");
        session.put_flash("Reservation Deleted");
    } else {
        session.put_warning("Reservation was already deleted");
    }

    Ok(Redirect::to(&return_path(src, &form.year, &form.month)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MonthQuery {
    y: Option<String>,
    m: Option<String>,
}

pub async fn calendar(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<MonthQuery>,
) -> Result<Response, WebError> {
    let today = chrono::Local::now().date_naive();
    let year = match query.y.as_deref().filter(|s| !s.is_empty()) {
        Some(y) => y.parse().map_err(|_| WebError::BadRequest("Invalid year".to_string()))?,
        None => today.year(),
    };
    let month = match query.m.as_deref().filter(|s| !s.is_empty()) {
        Some(m) => m.parse().map_err(|_| WebError::BadRequest("Invalid month".to_string()))?,
        None => today.month(),
    };

    let view = match booking::build_month_view(&state.db, year, month).await {
        Ok(view) => view,
        Err(CalendarError::Storage(e)) => return Err(WebError::Storage(e)),
        Err(e) => return Err(WebError::BadRequest(e.to_string())),
    };

    Ok(render_template(CalendarTemplate::new(
        PageMeta::from_session(&session),
        &view,
    )))
}

pub async fn calendar_submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, WebError> {
    let value = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    };

    verify_csrf(&session, value("csrf_token"))?;

    let year: i32 = value("year")
        .parse()
        .map_err(|_| WebError::BadRequest("Invalid year".to_string()))?;
    let month: u32 = value("month")
        .parse()
        .map_err(|_| WebError::BadRequest("Invalid month".to_string()))?;

    let submission = CalendarSubmission {
        year,
        month,
        version: value("version").to_string(),
        fields: fields.iter().map(|(k, _)| k.clone()).collect::<HashSet<_>>(),
    };

    match booking::apply_calendar_edits(&state.db, &submission).await {
        Ok(outcome) => {
            if outcome.failed > 0 {
                session.put_warning("Some calendar changes could not be saved");
            } else if outcome.removed + outcome.added > 0 {
                session.put_flash("Reservation calendar updated");
            }
        }
        Err(CalendarError::Stale) => {
            session.put_error(
                "The calendar changed while you were editing it. Please review it and try again.",
            );
        }
        Err(CalendarError::Storage(e)) => return Err(WebError::Storage(e)),
        Err(e) => return Err(WebError::BadRequest(e.to_string())),
    }

    Ok(Redirect::to(&format!("/admin/reservations-calendar?y={}&m={}", year, month)).into_response())
}

pub async fn rooms(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, WebError> {
    let rooms = Room::list_all(&state.db).await?;
    Ok(render_template(RoomsTemplate {
        meta: PageMeta::from_session(&session),
        rooms,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoomForm {
    csrf_token: String,
    room_name: String,
    price: String,
    image_src: String,
    description: String,
}

impl RoomForm {
    fn input(&self) -> RoomInput {
        RoomInput {
            room_name: self.room_name.trim().to_string(),
            price: self.price.trim().to_string(),
            image_src: self.image_src.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }
}

/// All fields required; name 5 to 30 characters, description 5 to 20000
pub fn validate_room(input: &RoomInput) -> FormErrors {
    let mut errors = FormErrors::new();
    for (field, value) in [
        ("room_name", &input.room_name),
        ("price", &input.price),
        ("image_src", &input.image_src),
        ("description", &input.description),
    ] {
        errors.check(field, validate_required(value));
    }
    if !errors.has("room_name") {
        errors.check("room_name", validate_length(&input.room_name, 5, 30));
    }
    if !errors.has("description") {
        errors.check("description", validate_length(&input.description, 5, 20000));
    }
    errors
}

pub async fn room_new_page(session: Session) -> Response {
    render_template(RoomFormTemplate {
        meta: PageMeta::from_session(&session),
        room_id: None,
        room: RoomInput::default(),
        errors: FormErrors::new(),
    })
}

pub async fn room_create(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<RoomForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let input = form.input();
    let errors = validate_room(&input);

    if !errors.is_empty() {
        session.put_error("Invalid form input");
        return Ok(render_template(RoomFormTemplate {
            meta: PageMeta::from_session(&session),
            room_id: None,
            room: input,
            errors,
        }));
    }

    let id = Room::insert(&state.db, &input).await?;
    tracing::info!(room_id = id, name = %input.room_name, "Room created");
    session.put_flash("Room Created Successfully");
    Ok(Redirect::to("/admin/rooms").into_response())
}

pub async fn room_edit_page(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;
    let room = Room::find(&state.db, id).await?.ok_or(WebError::NotFound)?;

    Ok(render_template(RoomFormTemplate {
        meta: PageMeta::from_session(&session),
        room_id: Some(room.id),
        room: RoomInput {
            room_name: room.room_name,
            price: room.price,
            image_src: room.image_src,
            description: room.description,
        },
        errors: FormErrors::new(),
    }))
}

pub async fn room_update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<RoomForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;
    let input = form.input();
    let errors = validate_room(&input);

    if !errors.is_empty() {
        session.put_error("Invalid inputs");
        return Ok(render_template(RoomFormTemplate {
            meta: PageMeta::from_session(&session),
            room_id: Some(id),
            room: input,
            errors,
        }));
    }

    if !Room::update(&state.db, id, &input).await? {
        return Err(WebError::NotFound);
    }
    tracing::info!(room_id = id, "Room updated");
    session.put_flash("Room Updated");
    Ok(Redirect::to("/admin/rooms").into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CsrfForm {
    csrf_token: String,
}

pub async fn room_delete(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<CsrfForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;

    match Room::delete(&state.db, id).await {
        Ok(true) => {
            tracing::info!(room_id = id, "Room deleted");
            session.put_flash("Room Deleted");
        }
        Ok(false) => session.put_warning("Room was already deleted"),
        Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
            session.put_error("This room still has reservations or blocks and cannot be deleted");
        }
        Err(e) => return Err(WebError::Storage(e)),
    }

    Ok(Redirect::to("/admin/rooms").into_response())
}

pub async fn todo_list(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Response, WebError> {
    let Some(user_id) = session.user_id() else {
        return Ok(Redirect::to("/user/login").into_response());
    };
    let items = TodoItem::list_for_user(&state.db, user_id).await?;

    Ok(render_template(TodoTemplate {
        meta: PageMeta::from_session(&session),
        items,
        todo: String::new(),
        errors: FormErrors::new(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TodoForm {
    csrf_token: String,
    todo: String,
}

pub async fn todo_create(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<TodoForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let Some(user_id) = session.user_id() else {
        return Ok(Redirect::to("/user/login").into_response());
    };

    let todo = form.todo.trim().to_string();
    let mut errors = FormErrors::new();
    errors.check("todo", validate_required(&todo));
    if !errors.has("todo") {
        errors.check("todo", validate_length(&todo, 5, 255));
    }

    if !errors.is_empty() {
        let items = TodoItem::list_for_user(&state.db, user_id).await?;
        session.put_error("Invalid form input. A to-do must be 5 to 255 characters long.");
        return Ok(render_template(TodoTemplate {
            meta: PageMeta::from_session(&session),
            items,
            todo,
            errors,
        }));
    }

    TodoItem::insert(&state.db, user_id, &todo).await?;
    session.put_flash("Todo Created Successfully");
    Ok(Redirect::to("/admin/todo-list").into_response())
}

pub async fn todo_delete(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<CsrfForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;
    let Some(user_id) = session.user_id() else {
        return Ok(Redirect::to("/user/login").into_response());
    };
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;

    if TodoItem::delete(&state.db, id, user_id).await? {
        session.put_flash("Todo Deleted");
    } else {
        session.put_warning("Todo not found");
    }
    Ok(Redirect::to("/admin/todo-list").into_response())
}
