// Public pages

use axum::{
    extract::{Path, State},
    response::Response,
};
use std::sync::Arc;

use super::templates::{AboutTemplate, ContactTemplate, HomeTemplate, PageMeta, RoomTemplate};
use super::{render_template, WebError};
use crate::db::Room;
use crate::session::Session;
use crate::validation::parse_positive_id;
use crate::AppState;

pub async fn home(State(state): State<Arc<AppState>>, session: Session) -> Result<Response, WebError> {
    let rooms = Room::list_all(&state.db).await?;
    Ok(render_template(HomeTemplate {
        meta: PageMeta::from_session(&session),
        rooms,
    }))
}

pub async fn about(session: Session) -> Response {
    render_template(AboutTemplate {
        meta: PageMeta::from_session(&session),
    })
}

pub async fn contact(session: Session) -> Response {
    render_template(ContactTemplate {
        meta: PageMeta::from_session(&session),
    })
}

pub async fn room_detail(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_positive_id(&id).map_err(|_| WebError::NotFound)?;
    let room = Room::find(&state.db, id).await?.ok_or(WebError::NotFound)?;

    Ok(render_template(RoomTemplate {
        meta: PageMeta::from_session(&session),
        room,
    }))
}
