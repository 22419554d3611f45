use axum::{
    Form, debug_handler,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult,
    backend::{Backend, BackendError, BackendResult, SqliteBackend},
    models::Room,
    session::AuthContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Cancelled,
    Deleted,
}

/// Deletes the room's messages, then the room. A failure in the second step
/// leaves the messages deleted.
pub async fn delete_room<B: Backend>(
    backend: &B,
    auth: &AuthContext,
    room: &Room,
    confirmed: bool,
) -> BackendResult<DeleteOutcome> {
    if !confirmed {
        return Ok(DeleteOutcome::Cancelled);
    }

    let user = auth.require()?;
    if user.id != room.creator_id {
        return Err(BackendError::NotCreator);
    }

    let messages = backend.delete_room_messages(room.id).await?;
    if backend.delete_room(room.id).await? == 0 {
        return Err(BackendError::NotFound("room"));
    }

    tracing::info!(room_id = %room.id, messages, "deleted room");
    Ok(DeleteOutcome::Deleted)
}

#[derive(Deserialize)]
pub(crate) struct DeleteRoomQuery {
    #[serde(default)]
    confirm: String,
}

#[debug_handler]
pub(crate) async fn delete_room_handler(
    State(backend): State<SqliteBackend>,
    session: Session,
    Path(room_id): Path<Uuid>,

    Form(DeleteRoomQuery { confirm }): Form<DeleteRoomQuery>,
) -> AppResult<Response> {
    let auth = AuthContext::resolve(&session, &backend).await?;
    if auth.user().is_none() {
        return Ok(Redirect::to("/").into_response());
    }

    let back = format!("/room/{room_id}");
    let room = match backend.room(room_id).await {
        Ok(room) => room,
        Err(err) => {
            tracing::warn!(%room_id, "failed to fetch room for deletion: {err}");
            return Ok(Redirect::to("/").into_response());
        }
    };

    match delete_room(&backend, &auth, &room, confirm == "yes").await {
        Ok(DeleteOutcome::Deleted) => Ok(Redirect::to("/").into_response()),
        Ok(DeleteOutcome::Cancelled) => Ok(Redirect::to(&back).into_response()),
        Err(err) => {
            tracing::error!(%room_id, "failed to delete room: {err}");
            Ok(Redirect::to(&format!("{back}?delete_failed=true")).into_response())
        }
    }
}
