// Askama template definitions

use askama::Template;
use chrono::NaiveDate;

use crate::booking::MonthView;
use crate::booking::calendar::{add_block_field, remove_block_field};
use crate::db::{GuestDetails, Reservation, Room, RoomInput, TodoItem};
use crate::session::{PendingReservation, ReservationSummary, Session};
use crate::validation::FormErrors;

/// Shared by every page: one-time messages, CSRF token, login state
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub flash: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub csrf_token: String,
    pub authenticated: bool,
}

impl PageMeta {
    /// Consumes the session's one-time messages
    pub fn from_session(session: &Session) -> Self {
        let messages = session.take_messages();
        Self {
            flash: messages.flash,
            warning: messages.warning,
            error: messages.error,
            csrf_token: session.csrf_token(),
            authenticated: session.is_authenticated(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub meta: PageMeta,
    pub status: u16,
    pub message: String,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub meta: PageMeta,
    pub rooms: Vec<Room>,
}

#[derive(Template)]
#[template(path = "about.html")]
pub struct AboutTemplate {
    pub meta: PageMeta,
}

#[derive(Template)]
#[template(path = "contact.html")]
pub struct ContactTemplate {
    pub meta: PageMeta,
}

#[derive(Template)]
#[template(path = "room.html")]
pub struct RoomTemplate {
    pub meta: PageMeta,
    pub room: Room,
}

#[derive(Template)]
#[template(path = "search.html")]
pub struct SearchTemplate {
    pub meta: PageMeta,
}

#[derive(Template)]
#[template(path = "available-rooms.html")]
pub struct AvailableRoomsTemplate {
    pub meta: PageMeta,
    pub rooms: Vec<Room>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Template)]
#[template(path = "make-reservation.html")]
pub struct MakeReservationTemplate {
    pub meta: PageMeta,
    pub pending: PendingReservation,
    pub room_name: String,
    pub guest: GuestDetails,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "reservation-summary.html")]
pub struct ReservationSummaryTemplate {
    pub meta: PageMeta,
    pub summary: ReservationSummary,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub meta: PageMeta,
    pub email: String,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub meta: PageMeta,
    pub new_reservations: usize,
    pub all_reservations: usize,
    pub rooms: usize,
}

#[derive(Template)]
#[template(path = "admin/reservations.html")]
pub struct ReservationsTemplate {
    pub meta: PageMeta,
    pub title: String,
    pub src: String,
    pub reservations: Vec<Reservation>,
}

#[derive(Template)]
#[template(path = "admin/reservation.html")]
pub struct ReservationTemplate {
    pub meta: PageMeta,
    pub src: String,
    pub reservation: Reservation,
    pub guest: GuestDetails,
    pub errors: FormErrors,
    /// Calendar month to return to, empty when opened from a list
    pub year: String,
    pub month: String,
}

/// One day of one room on the calendar
pub struct CalendarCell {
    pub day: u32,
    pub reservation_id: i64,
    pub block_id: i64,
    pub remove_field: String,
    pub add_field: String,
}

pub struct CalendarRow {
    pub room_id: i64,
    pub room_name: String,
    pub cells: Vec<CalendarCell>,
}

#[derive(Template)]
#[template(path = "admin/calendar.html")]
pub struct CalendarTemplate {
    pub meta: PageMeta,
    pub title: String,
    pub year: i32,
    pub month: u32,
    pub previous_year: i32,
    pub previous_month: u32,
    pub next_year: i32,
    pub next_month: u32,
    pub version: String,
    pub days: Vec<u32>,
    pub rows: Vec<CalendarRow>,
}

impl CalendarTemplate {
    pub fn new(meta: PageMeta, view: &MonthView) -> Self {
        use chrono::Datelike;

        let days = view.days();
        let rows = view
            .rooms
            .iter()
            .map(|row| CalendarRow {
                room_id: row.room.id,
                room_name: row.room.room_name.clone(),
                cells: days
                    .iter()
                    .map(|d| CalendarCell {
                        day: d.day(),
                        reservation_id: row.reservation_on(d),
                        block_id: row.block_on(d),
                        remove_field: remove_block_field(row.room.id, *d),
                        add_field: add_block_field(row.room.id, *d),
                    })
                    .collect(),
            })
            .collect();

        let previous = view.previous_month();
        let next = view.next_month();

        Self {
            meta,
            title: view.first_day.format("%B %Y").to_string(),
            year: view.year(),
            month: view.month(),
            previous_year: previous.year(),
            previous_month: previous.month(),
            next_year: next.year(),
            next_month: next.month(),
            version: view.version.clone(),
            days: days.iter().map(|d| d.day()).collect(),
            rows,
        }
    }
}

#[derive(Template)]
#[template(path = "admin/rooms.html")]
pub struct RoomsTemplate {
    pub meta: PageMeta,
    pub rooms: Vec<Room>,
}

#[derive(Template)]
#[template(path = "admin/room-form.html")]
pub struct RoomFormTemplate {
    pub meta: PageMeta,
    /// None while creating
    pub room_id: Option<i64>,
    pub room: RoomInput,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "admin/todo.html")]
pub struct TodoTemplate {
    pub meta: PageMeta,
    pub items: Vec<TodoItem>,
    pub todo: String,
    pub errors: FormErrors,
}
