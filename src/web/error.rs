//! Error pages.
//!
//! Handlers return `Result<Response, WebError>`. Storage and template failures are
//! logged here and the visitor only sees a generic page.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use super::templates::{ErrorTemplate, PageMeta};

#[derive(Debug, Error)]
pub enum WebError {
    #[error("page not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid or missing CSRF token")]
    Csrf,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

impl WebError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebError::NotFound => StatusCode::NOT_FOUND,
            WebError::BadRequest(_) | WebError::Csrf => StatusCode::BAD_REQUEST,
            WebError::Storage(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            WebError::Storage(_) | WebError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::NOT_FOUND => "The page you requested could not be found.".to_string(),
            StatusCode::BAD_REQUEST => match self {
                WebError::BadRequest(message) => message.clone(),
                _ => "Your request could not be verified. Please reload the page and try again."
                    .to_string(),
            },
            _ => "Something went wrong on our side. Please try again later.".to_string(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            WebError::Storage(e) => tracing::error!(error = %e, "Database error"),
            WebError::Template(e) => tracing::error!(error = %e, "Template error"),
            WebError::Csrf => tracing::warn!("Rejected request with bad CSRF token"),
            _ => tracing::debug!(error = %self, "Request failed"),
        }

        let template = ErrorTemplate {
            meta: PageMeta::default(),
            status: status.as_u16(),
            message: self.public_message(),
        };
        match template.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => (status, format!("Error: {}", e)).into_response(),
        }
    }
}
