//! HTTP surface: public pages, the booking flow, login and the admin back office.

mod admin;
mod error;
mod login;
mod pages;
mod reservations;
pub mod templates;

pub use error::WebError;

use askama::Template;
use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::session::{session_middleware, Session};
use crate::AppState;

/// Render a template, turning failures into the error page
fn render_template<T: Template>(template: T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => WebError::Template(e).into_response(),
    }
}

/// Every state-changing form carries the session's CSRF token
fn verify_csrf(session: &Session, submitted: &str) -> Result<(), WebError> {
    if session.verify_csrf(submitted) {
        Ok(())
    } else {
        Err(WebError::Csrf)
    }
}

/// Redirect visitors without a logged-in user to the login page
async fn require_auth(request: Request<Body>, next: Next) -> Response {
    let session = request.extensions().get::<Session>().cloned();
    match session {
        Some(session) if session.is_authenticated() => next.run(request).await,
        Some(session) => {
            tracing::debug!(path = %request.uri().path(), "Unauthenticated admin request");
            session.put_error("Please login to your account");
            Redirect::to("/user/login").into_response()
        }
        None => Redirect::to("/user/login").into_response(),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/dashboard", get(admin::dashboard))
        // Reservations
        .route("/reservations-new", get(admin::reservations_new))
        .route("/reservations-all", get(admin::reservations_all))
        .route(
            "/reservations-calendar",
            get(admin::calendar).post(admin::calendar_submit),
        )
        .route(
            "/reservations/:src/:id",
            get(admin::reservation_detail).post(admin::reservation_update),
        )
        .route("/reservations/:src/:id/process", post(admin::reservation_process))
        .route("/reservations/:src/:id/delete", post(admin::reservation_delete))
        // Rooms
        .route("/rooms", get(admin::rooms))
        .route("/rooms/new", get(admin::room_new_page).post(admin::room_create))
        .route("/rooms/:id", get(admin::room_edit_page).post(admin::room_update))
        .route("/rooms/:id/delete", post(admin::room_delete))
        // To-do list
        .route("/todo-list", get(admin::todo_list).post(admin::todo_create))
        .route("/todo-list/:id/delete", post(admin::todo_delete))
        .route_layer(middleware::from_fn(require_auth));

    Router::new()
        .route("/", get(pages::home))
        .route("/about", get(pages::about))
        .route("/contact", get(pages::contact))
        .route("/rooms/:id", get(pages::room_detail))
        // Booking flow
        .route(
            "/reservation",
            get(reservations::search_page).post(reservations::search_submit),
        )
        .route("/reservation-json", post(reservations::availability_json))
        .route("/choose-room/:id", get(reservations::choose_room))
        .route("/book-room", get(reservations::book_room))
        .route(
            "/make-reservation",
            get(reservations::make_reservation_page).post(reservations::make_reservation_submit),
        )
        .route("/reservation-summary", get(reservations::reservation_summary))
        // Login
        .route("/user/login", get(login::login_page).post(login::login_submit))
        .route("/user/logout", get(login::logout))
        .nest("/admin", admin_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .nest_service("/static", ServeDir::new(&state.config.server.static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::reservations::AvailabilityResponse;
    use super::*;
    use crate::booking::{is_room_available, submit_reservation, ReservationForm};
    use crate::config::{Config, MailConfig};
    use crate::db::{ensure_admin_user, seed_rooms, test_pool, Reservation};
    use crate::mail::MailData;
    use chrono::NaiveDate;
    use sqlx::SqlitePool;
    use tokio::sync::mpsc::UnboundedReceiver;
    use axum::http::{header, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const ADMIN_EMAIL: &str = "admin@example.com";
    const ADMIN_PASSWORD: &str = "correct-horse";

    struct TestApp {
        router: Router,
        db: SqlitePool,
        mail: UnboundedReceiver<MailData>,
    }

    async fn test_app_with_db() -> TestApp {
        let db = test_pool().await;
        seed_rooms(&db).await.unwrap();
        ensure_admin_user(&db, ADMIN_EMAIL, ADMIN_PASSWORD, "Admin")
            .await
            .unwrap();
        let (mail_tx, mail) = crate::mail::channel();
        let router = create_router(Arc::new(AppState::new(Config::default(), db.clone(), mail_tx)));
        TestApp { router, db, mail }
    }

    async fn test_app() -> Router {
        test_app_with_db().await.router
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// `name=value` part of the session cookie, if one was set
    fn session_cookie(response: &Response) -> Option<String> {
        response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.to_string())
    }

    fn location(response: &Response) -> &str {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn hidden_value(html: &str, name: &str) -> String {
        let marker = format!(r#"name="{}" value=""#, name);
        let start = html.find(&marker).expect("page has the hidden field") + marker.len();
        let end = html[start..].find('"').unwrap();
        html[start..start + end].to_string()
    }

    fn csrf_from(html: &str) -> String {
        hidden_value(html, "csrf_token")
    }

    /// Fetch a page and return its body with the CSRF token it carries
    async fn page_with_token(app: &Router, uri: &str, cookie: &str) -> (String, String) {
        let response = app
            .clone()
            .oneshot(get_request(uri, Some(cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        let html = body_text(response).await;
        let token = csrf_from(&html);
        (html, token)
    }

    /// Log the seeded admin in and return the rotated session cookie
    async fn admin_cookie(app: &Router) -> String {
        let (cookie, token) = login_form(app).await;
        let body = format!(
            "csrf_token={}&email=admin%40example.com&password={}",
            token, ADMIN_PASSWORD
        );
        let response = app
            .clone()
            .oneshot(post_form("/user/login", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(location(&response), "/admin/dashboard");
        session_cookie(&response).expect("new session cookie")
    }

    /// Guest session cookie and token, taken from the search page
    async fn guest_session(app: &Router) -> (String, String) {
        let page = app
            .clone()
            .oneshot(get_request("/reservation", None))
            .await
            .unwrap();
        let cookie = session_cookie(&page).expect("session cookie");
        let token = csrf_from(&body_text(page).await);
        (cookie, token)
    }

    fn booking(room_id: i64, start: &str, end: &str) -> ReservationForm {
        ReservationForm {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: "555-0199".to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            room_id: room_id.to_string(),
        }
    }

    async fn stored_reservation(app: &TestApp, form: &ReservationForm) -> i64 {
        let (mail_tx, _) = crate::mail::channel();
        submit_reservation(&app.db, &mail_tx, &MailConfig::default(), form)
            .await
            .unwrap()
    }

    async fn availability(app: &Router, cookie: &str, body: &str) -> AvailabilityResponse {
        let response = app
            .clone()
            .oneshot(post_form("/reservation-json", Some(cookie), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    /// Open the login page and return the session cookie and its CSRF token
    async fn login_form(app: &Router) -> (String, String) {
        let response = app
            .clone()
            .oneshot(get_request("/user/login", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response).expect("session cookie");
        let token = csrf_from(&body_text(response).await);
        (cookie, token)
    }

    #[tokio::test]
    async fn test_home_lists_rooms() {
        let app = test_app().await;
        let response = app.oneshot(get_request("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("General&#x27;s Quarters") || body.contains("General's Quarters"));
        assert!(body.contains("Major&#x27;s Suite") || body.contains("Major's Suite"));
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let app = test_app().await;
        let response = app.oneshot(get_request("/rooms/999", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_requires_login() {
        let app = test_app().await;
        let response = app
            .oneshot(get_request("/admin/dashboard", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/user/login");
    }

    #[tokio::test]
    async fn test_post_without_csrf_token_is_rejected() {
        let app = test_app().await;
        let response = app
            .oneshot(post_form(
                "/reservation",
                None,
                "start=2050-01-01&end=2050-01-02",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_login_is_generic() {
        let app = test_app().await;
        let (cookie, token) = login_form(&app).await;

        let attempts = [
            format!("csrf_token={}&email=nobody%40example.com&password=whatever", token),
            format!("csrf_token={}&email=admin%40example.com&password=wrong-password", token),
        ];

        for body in attempts {
            let response = app
                .clone()
                .oneshot(post_form("/user/login", Some(&cookie), &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/user/login");

            let page = app
                .clone()
                .oneshot(get_request("/user/login", Some(&cookie)))
                .await
                .unwrap();
            assert!(body_text(page).await.contains("Invalid email/password"));
        }
    }

    #[tokio::test]
    async fn test_login_rotates_session_and_opens_admin() {
        let app = test_app().await;
        let (cookie, token) = login_form(&app).await;

        let body = format!(
            "csrf_token={}&email=admin%40example.com&password={}",
            token, ADMIN_PASSWORD
        );
        let response = app
            .clone()
            .oneshot(post_form("/user/login", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/admin/dashboard");

        let rotated = session_cookie(&response).expect("new session cookie");
        assert_ne!(rotated, cookie);

        // The pre-login token no longer grants anything
        let stale = app
            .clone()
            .oneshot(get_request("/admin/dashboard", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(stale.status(), StatusCode::SEE_OTHER);

        let dashboard = app
            .oneshot(get_request("/admin/dashboard", Some(&rotated)))
            .await
            .unwrap();
        assert_eq!(dashboard.status(), StatusCode::OK);
        assert!(body_text(dashboard).await.contains("Login Successful"));
    }

    #[tokio::test]
    async fn test_search_lists_available_rooms() {
        let app = test_app().await;
        let page = app
            .clone()
            .oneshot(get_request("/reservation", None))
            .await
            .unwrap();
        let cookie = session_cookie(&page).expect("session cookie");
        let token = csrf_from(&body_text(page).await);

        let body = format!("csrf_token={}&start=2050-01-01&end=2050-01-02", token);
        let response = app
            .oneshot(post_form("/reservation", Some(&cookie), &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("/choose-room/1"));
        assert!(html.contains("/choose-room/2"));
    }

    #[tokio::test]
    async fn test_direct_booking_link_through_summary() {
        let mut app = test_app_with_db().await;
        let router = app.router.clone();
        let (cookie, _) = guest_session(&router).await;

        let response = router
            .clone()
            .oneshot(get_request(
                "/book-room?id=1&sd=2050-03-01&ed=2050-03-02",
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/make-reservation");

        let (html, token) = page_with_token(&router, "/make-reservation", &cookie).await;
        assert!(html.contains("2050-03-01"));

        // Too short a name keeps the guest on the form with their input
        let body = format!(
            "csrf_token={}&first_name=Al&last_name=Turing&email=alan%40example.com&phone=555-0142",
            token
        );
        let response = router
            .clone()
            .oneshot(post_form("/make-reservation", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Invalid form input"));
        assert!(html.contains("This field must be at least 3 characters long"));
        assert!(html.contains(r#"value="Turing""#));

        let body = format!(
            "csrf_token={}&first_name=Alan&last_name=Turing&email=alan%40example.com&phone=555-0142",
            token
        );
        let response = router
            .clone()
            .oneshot(post_form("/make-reservation", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/reservation-summary");

        let summary = router
            .clone()
            .oneshot(get_request("/reservation-summary", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::OK);
        let html = body_text(summary).await;
        assert!(html.contains("Alan Turing"));
        assert!(html.contains("alan@example.com"));

        // The summary is shown once
        let again = router
            .clone()
            .oneshot(get_request("/reservation-summary", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&again), "/");

        let start = NaiveDate::from_ymd_opt(2050, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2050, 3, 2).unwrap();
        assert!(!is_room_available(&app.db, 1, start, end).await.unwrap());

        let first = app.mail.recv().await.unwrap();
        let second = app.mail.recv().await.unwrap();
        assert_eq!(first.to, "alan@example.com");
        assert_ne!(second.to, "alan@example.com");
    }

    #[tokio::test]
    async fn test_choose_room_after_search() {
        let app = test_app().await;
        let (cookie, token) = guest_session(&app).await;

        let body = format!("csrf_token={}&start=2050-04-10&end=2050-04-12", token);
        let response = app
            .clone()
            .oneshot(post_form("/reservation", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get_request("/choose-room/2", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/make-reservation");

        let (html, _) = page_with_token(&app, "/make-reservation", &cookie).await;
        assert!(html.contains("2050-04-10"));
        assert!(html.contains("2050-04-12"));
    }

    #[tokio::test]
    async fn test_make_reservation_without_room_goes_home() {
        let app = test_app().await;
        let (cookie, _) = guest_session(&app).await;

        let response = app
            .oneshot(get_request("/make-reservation", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn test_room_availability_json() {
        let app = test_app_with_db().await;
        let router = app.router.clone();
        let (cookie, token) = guest_session(&router).await;

        let body = format!(
            "csrf_token={}&start=2050-05-01&end=2050-05-03&room_id=1",
            token
        );
        let free = availability(&router, &cookie, &body).await;
        assert_eq!(
            free,
            AvailabilityResponse {
                ok: true,
                message: String::new(),
                start_date: "2050-05-01".to_string(),
                end_date: "2050-05-03".to_string(),
                room_id: "1".to_string(),
            }
        );

        stored_reservation(&app, &booking(1, "2050-05-03", "2050-05-04")).await;
        let taken = availability(&router, &cookie, &body).await;
        assert!(!taken.ok);
        assert_eq!(taken.message, "Not available for the selected dates");
        assert_eq!(taken.room_id, "1");

        let body = format!(
            "csrf_token={}&start=2050-05-03&end=2050-05-01&room_id=1",
            token
        );
        let invalid = availability(&router, &cookie, &body).await;
        assert!(!invalid.ok);
        assert_eq!(invalid.message, "Invalid dates or room");
        assert!(invalid.start_date.is_empty());
    }

    #[tokio::test]
    async fn test_calendar_submit_adds_and_removes_blocks() {
        let app = test_app_with_db().await;
        let router = app.router.clone();
        let cookie = admin_cookie(&router).await;
        let uri = "/admin/reservations-calendar?y=2050&m=1";
        let day = NaiveDate::from_ymd_opt(2050, 1, 5).unwrap();

        let (html, token) = page_with_token(&router, uri, &cookie).await;
        assert!(html.contains("add_block_1_2050-01-05"));
        let version = hidden_value(&html, "version");

        let body = format!(
            "csrf_token={}&year=2050&month=1&version={}&add_block_1_2050-01-05=on",
            token, version
        );
        let response = router
            .clone()
            .oneshot(post_form("/admin/reservations-calendar", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), uri);
        assert!(!is_room_available(&app.db, 1, day, day).await.unwrap());

        let (html, _) = page_with_token(&router, uri, &cookie).await;
        assert!(html.contains("Reservation calendar updated"));
        assert!(html.contains("remove_block_1_2050-01-05"));

        // Submitting the same form again is refused, the month changed since
        let response = router
            .clone()
            .oneshot(post_form("/admin/reservations-calendar", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let (html, _) = page_with_token(&router, uri, &cookie).await;
        assert!(html.contains("The calendar changed while you were editing it"));

        // Leaving the remove checkbox out of the form drops the block
        let (html, token) = page_with_token(&router, uri, &cookie).await;
        let version = hidden_value(&html, "version");
        let body = format!("csrf_token={}&year=2050&month=1&version={}", token, version);
        let response = router
            .clone()
            .oneshot(post_form("/admin/reservations-calendar", Some(&cookie), &body))
            .await
            .unwrap();
        assert_eq!(location(&response), uri);
        assert!(is_room_available(&app.db, 1, day, day).await.unwrap());
    }

    #[tokio::test]
    async fn test_calendar_rejects_out_of_range_month() {
        let app = test_app().await;
        let cookie = admin_cookie(&app).await;

        for uri in [
            "/admin/reservations-calendar?y=-300000&m=1",
            "/admin/reservations-calendar?y=2050&m=13",
            "/admin/reservations-calendar?y=next&m=1",
        ] {
            let response = app
                .clone()
                .oneshot(get_request(uri, Some(&cookie)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "GET {}", uri);
        }
    }

    #[tokio::test]
    async fn test_admin_edits_processes_and_deletes_reservation() {
        let app = test_app_with_db().await;
        let router = app.router.clone();
        let id = stored_reservation(&app, &booking(2, "2050-06-01", "2050-06-03")).await;
        let cookie = admin_cookie(&router).await;
        let detail = format!("/admin/reservations/all/{}", id);

        let (html, token) = page_with_token(&router, &detail, &cookie).await;
        assert!(html.contains("Grace"));

        let invalid = format!(
            "csrf_token={}&first_name=Grace&last_name=Hopper&email=not-an-email&phone=555-0199&year=&month=",
            token
        );
        let response = router
            .clone()
            .oneshot(post_form(&detail, Some(&cookie), &invalid))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Invalid inputs"));
        assert!(html.contains("Invalid email address"));

        let valid = format!(
            "csrf_token={}&first_name=Grace&last_name=Murray&email=grace%40example.com&phone=555-0199&year=&month=",
            token
        );
        let response = router
            .clone()
            .oneshot(post_form(&detail, Some(&cookie), &valid))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/admin/reservations-all");
        let stored = Reservation::find(&app.db, id).await.unwrap().unwrap();
        assert_eq!(stored.last_name, "Murray");
        assert!(!stored.is_processed());

        // Opened from the calendar, actions return to that month
        let body = format!("csrf_token={}&year=2050&month=6", token);
        let response = router
            .clone()
            .oneshot(post_form(
                &format!("/admin/reservations/cal/{}/process", id),
                Some(&cookie),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(location(&response), "/admin/reservations-calendar?y=2050&m=6");
        let stored = Reservation::find(&app.db, id).await.unwrap().unwrap();
        assert!(stored.is_processed());

        let body = format!("csrf_token={}&year=&month=", token);
        let response = router
            .clone()
            .oneshot(post_form(
                &format!("/admin/reservations/new/{}/delete", id),
                Some(&cookie),
                &body,
            ))
            .await
            .unwrap();
        assert_eq!(location(&response), "/admin/reservations-new");
        assert!(Reservation::find(&app.db, id).await.unwrap().is_none());

        let start = NaiveDate::from_ymd_opt(2050, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2050, 6, 3).unwrap();
        assert!(is_room_available(&app.db, 2, start, end).await.unwrap());

        let (html, _) = page_with_token(&router, "/admin/reservations-new", &cookie).await;
        assert!(html.contains("Reservation Deleted"));
    }

    #[tokio::test]
    async fn test_admin_reservation_from_unknown_source_is_not_found() {
        let app = test_app_with_db().await;
        let router = app.router.clone();
        let id = stored_reservation(&app, &booking(1, "2050-07-01", "2050-07-02")).await;
        let cookie = admin_cookie(&router).await;

        let response = router
            .oneshot(get_request(&format!("/admin/reservations/old/{}", id), Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
