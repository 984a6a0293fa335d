//! Room availability, the guest booking workflow and the admin calendar.

pub mod availability;
pub mod calendar;
pub mod reservation;

pub use availability::{is_room_available, list_available_rooms};
pub use calendar::{
    apply_calendar_edits, build_month_view, CalendarEditOutcome, CalendarError, CalendarSubmission,
    MonthView, RoomMonth,
};
pub use reservation::{submit_reservation, validate_guest, BookingError, ReservationForm};
