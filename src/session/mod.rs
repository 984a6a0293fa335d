//! Server-side sessions.
//!
//! The cookie only carries a random token. Session data lives in the `sessions`
//! table under the token's SHA-256 hash. [`session_middleware`] loads the data
//! before the handler runs and writes it back afterwards when it changed, so
//! handlers work with a plain [`Session`] handle.

mod store;

pub use store::{generate_token, hash_token, spawn_cleanup_task, SessionStore};

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::db::GuestDetails;
use crate::AppState;

/// Dates (and later the room) a guest picked before filling in their details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingReservation {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub room_id: Option<i64>,
    pub room_name: Option<String>,
}

/// Shown once on the summary page after a successful booking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationSummary {
    pub reservation_id: i64,
    pub guest: GuestDetails,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub room_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionData {
    pub user_id: Option<i64>,
    pub flash: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub csrf_token: Option<String>,
    pub reservation: Option<PendingReservation>,
    pub summary: Option<ReservationSummary>,
}

/// One-time messages, removed from the session when read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Messages {
    pub flash: Option<String>,
    pub warning: Option<String>,
    pub error: Option<String>,
}

struct SessionState {
    data: SessionData,
    dirty: bool,
    renew: bool,
}

/// Handle to the current request's session
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new(data: SessionData) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                data,
                dirty: false,
                renew: false,
            })),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&SessionData) -> R) -> R {
        f(&self.state.lock().data)
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        let mut state = self.state.lock();
        state.dirty = true;
        f(&mut state.data)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.read(|d| d.user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }

    /// Store the user and move the session to a fresh token
    pub fn log_in(&self, user_id: i64) {
        self.renew();
        self.update(|d| d.user_id = Some(user_id));
    }

    /// Issue a new token on the next write. The old row is deleted.
    pub fn renew(&self) {
        let mut state = self.state.lock();
        state.renew = true;
        state.dirty = true;
        state.data.csrf_token = None;
    }

    /// Drop everything stored so far and move to a fresh token
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.data = SessionData::default();
        state.renew = true;
        state.dirty = true;
    }

    pub fn put_flash(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|d| d.flash = Some(message));
    }

    pub fn put_warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|d| d.warning = Some(message));
    }

    pub fn put_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|d| d.error = Some(message));
    }

    pub fn take_messages(&self) -> Messages {
        let mut state = self.state.lock();
        let messages = Messages {
            flash: state.data.flash.take(),
            warning: state.data.warning.take(),
            error: state.data.error.take(),
        };
        if messages != Messages::default() {
            state.dirty = true;
        }
        messages
    }

    /// The session's CSRF token, created on first use
    pub fn csrf_token(&self) -> String {
        let mut state = self.state.lock();
        if let Some(token) = &state.data.csrf_token {
            return token.clone();
        }
        let token = generate_token();
        state.data.csrf_token = Some(token.clone());
        state.dirty = true;
        token
    }

    pub fn verify_csrf(&self, submitted: &str) -> bool {
        self.read(|d| match &d.csrf_token {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(submitted.as_bytes())),
            None => false,
        })
    }

    pub fn reservation(&self) -> Option<PendingReservation> {
        self.read(|d| d.reservation.clone())
    }

    pub fn set_reservation(&self, reservation: PendingReservation) {
        self.update(|d| d.reservation = Some(reservation));
    }

    pub fn clear_reservation(&self) {
        self.update(|d| d.reservation = None);
    }

    pub fn set_summary(&self, summary: ReservationSummary) {
        self.update(|d| d.summary = Some(summary));
    }

    pub fn take_summary(&self) -> Option<ReservationSummary> {
        let mut state = self.state.lock();
        let summary = state.data.summary.take();
        if summary.is_some() {
            state.dirty = true;
        }
        summary
    }

    fn snapshot(&self) -> (SessionData, bool, bool) {
        let state = self.state.lock();
        (state.data.clone(), state.dirty, state.renew)
    }
}

/// Extractor for the session loaded by [`session_middleware`]
#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("Session extractor used on a route without the session middleware");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// Load the session before the handler and persist it afterwards
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let cookie_name = state.config.session.cookie_name.clone();
    let token = jar.get(&cookie_name).map(|c| c.value().to_string());

    let loaded = match &token {
        Some(token) => match state.sessions.load(token).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load session");
                None
            }
        },
        None => None,
    };
    // A cookie without a live row starts over under a new token
    let token = if loaded.is_some() { token } else { None };

    let session = Session::new(loaded.unwrap_or_default());
    request.extensions_mut().insert(session.clone());

    let response = next.run(request).await;

    let (data, dirty, renew) = session.snapshot();
    if !dirty {
        return response;
    }

    let token = match token {
        Some(old) if renew => {
            if let Err(e) = state.sessions.delete(&old).await {
                tracing::warn!(error = %e, "Failed to delete renewed session");
            }
            generate_token()
        }
        Some(token) => token,
        None => generate_token(),
    };

    if let Err(e) = state.sessions.save(&token, &data).await {
        tracing::error!(error = %e, "Failed to save session");
        return response;
    }

    let cookie = Cookie::build((cookie_name, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.server.in_production)
        .build();

    (jar.add(cookie), response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_taken_once() {
        let session = Session::new(SessionData::default());
        session.put_flash("Login Successful");
        session.put_error("Invalid email/password");

        let messages = session.take_messages();
        assert_eq!(messages.flash.as_deref(), Some("Login Successful"));
        assert_eq!(messages.error.as_deref(), Some("Invalid email/password"));
        assert!(messages.warning.is_none());
        assert_eq!(session.take_messages(), Messages::default());
    }

    #[test]
    fn test_untouched_session_is_clean() {
        let session = Session::new(SessionData::default());
        let _ = session.user_id();
        let _ = session.take_messages();
        let (_, dirty, renew) = session.snapshot();
        assert!(!dirty);
        assert!(!renew);
    }

    #[test]
    fn test_csrf_token_is_stable_and_verified() {
        let session = Session::new(SessionData::default());
        assert!(!session.verify_csrf(""));

        let token = session.csrf_token();
        assert_eq!(session.csrf_token(), token);
        assert!(session.verify_csrf(&token));
        assert!(!session.verify_csrf("forged"));
        assert!(!session.verify_csrf(&token[..10]));
    }

    #[test]
    fn test_log_in_renews_and_rotates_csrf() {
        let session = Session::new(SessionData::default());
        let before = session.csrf_token();

        session.log_in(3);

        let (data, dirty, renew) = session.snapshot();
        assert!(dirty && renew);
        assert_eq!(data.user_id, Some(3));
        assert_ne!(session.csrf_token(), before);
    }

    #[test]
    fn test_destroy_clears_data() {
        let session = Session::new(SessionData {
            user_id: Some(1),
            flash: Some("x".to_string()),
            ..Default::default()
        });

        session.destroy();
        session.put_warning("You have logged out of your account");

        let (data, _, renew) = session.snapshot();
        assert!(renew);
        assert!(data.user_id.is_none());
        assert!(data.flash.is_none());
        assert_eq!(data.warning.as_deref(), Some("You have logged out of your account"));
    }

    #[test]
    fn test_summary_is_taken_once() {
        let session = Session::new(SessionData::default());
        session.set_summary(ReservationSummary {
            reservation_id: 9,
            guest: GuestDetails::default(),
            start_date: NaiveDate::from_ymd_opt(2050, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2050, 1, 2).unwrap(),
            room_name: "Major's Suite".to_string(),
        });

        assert_eq!(session.take_summary().map(|s| s.reservation_id), Some(9));
        assert!(session.take_summary().is_none());
    }
}
