// Admin login and logout

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;

use super::templates::{LoginTemplate, PageMeta};
use super::{render_template, verify_csrf, WebError};
use crate::auth::{self, AuthError};
use crate::session::Session;
use crate::validation::{validate_email, validate_required, FormErrors};
use crate::AppState;

pub const INVALID_CREDENTIALS: &str = "Invalid email/password";

pub async fn login_page(session: Session) -> Response {
    if session.is_authenticated() {
        session.put_warning("You are already logged in");
        return Redirect::to("/").into_response();
    }

    render_template(LoginTemplate {
        meta: PageMeta::from_session(&session),
        email: String::new(),
        errors: FormErrors::new(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    csrf_token: String,
    email: String,
    password: String,
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    verify_csrf(&session, &form.csrf_token)?;

    let email = form.email.trim().to_string();
    let mut errors = FormErrors::new();
    errors
        .check("email", validate_required(&email))
        .check("password", validate_required(&form.password));
    if !errors.has("email") {
        errors.check("email", validate_email(&email));
    }

    if !errors.is_empty() {
        session.put_error("Invalid inputs");
        return Ok(render_template(LoginTemplate {
            meta: PageMeta::from_session(&session),
            email,
            errors,
        }));
    }

    match auth::authenticate(&state.db, &email, &form.password).await {
        Ok(user_id) => {
            session.log_in(user_id);
            session.put_flash("Login Successful");
            tracing::info!(user_id = user_id, "User logged in");
            Ok(Redirect::to("/admin/dashboard").into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            session.put_error(INVALID_CREDENTIALS);
            Ok(Redirect::to("/user/login").into_response())
        }
        Err(AuthError::Storage(e)) => Err(WebError::Storage(e)),
    }
}

pub async fn logout(session: Session) -> Response {
    if let Some(user_id) = session.user_id() {
        tracing::info!(user_id = user_id, "User logged out");
    }
    session.destroy();
    session.put_warning("You have logged out of your account");
    Redirect::to("/").into_response()
}
