use axum::{
    Json, debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult,
    backend::{Backend, BackendResult, SqliteBackend},
    include_res,
    models::{Message, NewMessage},
    res,
    session::AuthContext,
};

#[derive(Deserialize)]
pub(crate) struct SendMessageQuery {
    content: String,
}

/// Inserts the trimmed draft as the current identity. Blank drafts write
/// nothing. The draft is cleared only once the insert succeeded; the message
/// itself shows up through the room's insert feed.
pub async fn send_message<B: Backend>(
    backend: &B,
    auth: &AuthContext,
    room_id: Uuid,
    draft: &mut String,
) -> BackendResult<Option<Message>> {
    let content = draft.trim();
    if content.is_empty() {
        return Ok(None);
    }

    let sender = auth.require()?;
    let message = backend
        .insert_message(NewMessage {
            room_id,
            sender_id: sender.id,
            content: content.to_owned(),
        })
        .await?;

    draft.clear();
    Ok(Some(message))
}

/// How one message is shown to one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageView<'a> {
    pub message: &'a Message,
    /// Own messages sit on the right without a name label.
    pub mine: bool,
    pub label: Option<&'a str>,
}

impl<'a> MessageView<'a> {
    pub fn new(message: &'a Message, viewer: Option<Uuid>) -> MessageView<'a> {
        let mine = viewer == Some(message.sender_id);
        let label = match &message.sender {
            Some(sender) if !mine => Some(sender.username.as_str()),
            _ => None,
        };
        MessageView { message, mine, label }
    }
}

pub(crate) fn msg_to_html(view: MessageView<'_>) -> String {
    let label = match view.label {
        Some(label) => format!(r#"<p class="sender">{}</p>"#, res::escape(label)),
        None => String::new(),
    };

    include_res!(str, "/pages/rooms/message.html")
        .replace("{id}", &view.message.id.to_string())
        .replace("{side}", if view.mine { "mine" } else { "theirs" })
        .replace("{label}", &label)
        .replace("{content}", &res::escape(&view.message.content))
        .replace("{time}", &res::timestamp(view.message.created_at))
}

#[debug_handler]
pub(crate) async fn send_msg(
    State(backend): State<SqliteBackend>,
    session: Session,
    Path(room_id): Path<Uuid>,

    Json(SendMessageQuery { mut content }): Json<SendMessageQuery>,
) -> AppResult<Response> {
    let auth = AuthContext::resolve(&session, &backend).await?;
    backend.room(room_id).await?;

    match send_message(&backend, &auth, room_id, &mut content).await {
        Ok(Some(_)) => Ok(StatusCode::NO_CONTENT.into_response()),
        Ok(None) => Ok((StatusCode::BAD_REQUEST, "message is empty").into_response()),
        Err(err) => {
            tracing::error!(%room_id, "failed to send message: {err}");
            Err(err.into())
        }
    }
}
