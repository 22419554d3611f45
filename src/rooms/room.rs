use std::collections::HashSet;

use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult,
    backend::{Backend, BackendResult, SqliteBackend, Subscription},
    include_res,
    models::{Message, Participant, Room, User},
    res,
    session::AuthContext,
};

use super::{
    delete::{self, DeleteOutcome},
    msg::{self, MessageView},
};

/// One viewed room: its metadata, messages and participants, owned for as
/// long as the room is on screen.
pub struct RoomSession {
    room: Room,
    viewer: Option<User>,
    messages: Vec<Message>,
    seen: HashSet<Uuid>,
    participants: Vec<Participant>,
    show_participants: bool,
    subscription: Option<Subscription>,
}

impl RoomSession {
    /// Loads the room and joins it. `None` means the room could not be
    /// fetched and the caller should go back to the directory.
    pub async fn enter<B: Backend>(
        backend: &B,
        auth: &AuthContext,
        room_id: Uuid,
    ) -> Option<RoomSession> {
        let viewer = auth.user().cloned();

        let (room, messages, participants, ()) = tokio::join!(
            backend.room(room_id),
            backend.room_messages(room_id),
            backend.room_participants(room_id),
            async {
                if let Some(user) = &viewer {
                    if let Err(err) = join_room(backend, room_id, user).await {
                        tracing::error!(%room_id, "failed to join room: {err}");
                    }
                }
            },
        );

        let room = match room {
            Ok(room) => room,
            Err(err) => {
                tracing::warn!(%room_id, "failed to fetch room: {err}");
                return None;
            }
        };
        let messages = messages.unwrap_or_else(|err| {
            tracing::error!(%room_id, "failed to fetch messages: {err}");
            Vec::new()
        });
        let participants = participants.unwrap_or_else(|err| {
            tracing::error!(%room_id, "failed to fetch participants: {err}");
            Vec::new()
        });

        Some(RoomSession {
            room,
            viewer,
            seen: messages.iter().map(|m| m.id).collect(),
            messages,
            participants,
            show_participants: false,
            subscription: None,
        })
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn views(&self) -> impl Iterator<Item = MessageView<'_>> {
        let viewer = self.viewer.as_ref().map(|user| user.id);
        self.messages.iter().map(move |m| MessageView::new(m, viewer))
    }

    /// The delete control is only offered to the room's creator.
    pub fn can_delete(&self) -> bool {
        self.viewer.as_ref().is_some_and(|user| user.id == self.room.creator_id)
    }

    pub fn show_participants(&self) -> bool {
        self.show_participants
    }

    pub fn toggle_participants(&mut self) {
        self.show_participants = !self.show_participants;
    }

    /// Like `enter`, but opens the insert feed before the history is fetched,
    /// so every message lands in one of the two. Overlap is dropped by
    /// `apply_insert`.
    pub async fn enter_live<B: Backend>(
        backend: &B,
        auth: &AuthContext,
        room_id: Uuid,
    ) -> Option<RoomSession> {
        let subscription = backend.subscribe_messages(room_id);
        let mut session = Self::enter(backend, auth, room_id).await?;
        session.subscription = Some(subscription);
        Some(session)
    }

    pub fn viewer(&self) -> Option<&User> {
        self.viewer.as_ref()
    }

    /// Messages after `shown`, the last message a client already has. An
    /// unknown or missing id yields the whole history.
    pub fn messages_after(&self, shown: Option<Uuid>) -> &[Message] {
        let start = shown
            .and_then(|id| self.messages.iter().position(|m| m.id == id))
            .map_or(0, |i| i + 1);
        &self.messages[start..]
    }

    /// Appends a realtime insert after everything already shown. Events for
    /// messages already in the list are dropped.
    pub fn apply_insert(&mut self, message: Message) -> bool {
        if message.room_id != self.room.id {
            return false;
        }
        if !self.seen.insert(message.id) {
            tracing::debug!(message_id = %message.id, "dropping duplicate insert event");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Waits for the next new message from the feed and appends it. Returns
    /// `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<&Message> {
        loop {
            let message = self.subscription.as_mut()?.recv().await?;
            if self.apply_insert(message) {
                return self.messages.last();
            }
        }
    }

    pub async fn send<B: Backend>(
        &self,
        backend: &B,
        auth: &AuthContext,
        draft: &mut String,
    ) -> BackendResult<Option<Message>> {
        msg::send_message(backend, auth, self.room.id, draft).await
    }

    pub async fn delete<B: Backend>(
        &self,
        backend: &B,
        auth: &AuthContext,
        confirmed: bool,
    ) -> BackendResult<DeleteOutcome> {
        delete::delete_room(backend, auth, &self.room, confirmed).await
    }

    /// Tears the view down, detaching from the insert feed.
    pub fn leave(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn render(&self, delete_failed: bool) -> String {
        let messages = if self.messages.is_empty() {
            include_res!(str, "/pages/rooms/no_messages.html").to_owned()
        } else {
            self.views().map(msg::msg_to_html).collect()
        };

        let participants: String = self
            .participants
            .iter()
            .map(|p| {
                include_res!(str, "/pages/rooms/participant.html")
                    .replace("{glyph}", &res::escape(&p.avatar_glyph()))
                    .replace("{name}", &res::escape(p.display_name()))
            })
            .collect();

        let delete_control = if self.can_delete() {
            include_res!(str, "/pages/rooms/delete_control.html").to_owned()
        } else {
            String::new()
        };

        let error = if delete_failed {
            r#"<div class="error">Failed to delete the room.</div>"#
        } else {
            ""
        };

        let (panel_hidden, toggle_href) = if self.show_participants {
            ("", "?")
        } else {
            ("hidden", "?participants=true")
        };

        include_res!(str, "/pages/rooms/room.html")
            .replace("{room_name}", &res::escape(&self.room.name))
            .replace("{participant_count}", &self.participants.len().to_string())
            .replace("{toggle_href}", toggle_href)
            .replace("{panel_hidden}", panel_hidden)
            .replace("{participants}", &participants)
            .replace("{delete_control}", &delete_control)
            .replace("{error}", error)
            .replace("{messages}", &messages)
            .replace("{room_id}", &self.room.id.to_string())
    }
}

/// Adds a participant row for `user` unless one exists. Returns whether a row
/// was inserted.
pub async fn join_room<B: Backend>(backend: &B, room_id: Uuid, user: &User) -> BackendResult<bool> {
    if backend.find_participant(room_id, user.id).await?.is_some() {
        return Ok(false);
    }

    backend.insert_participant(room_id, user.id).await?;
    tracing::info!(%room_id, user_id = %user.id, "joined room");
    Ok(true)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RoomQuery {
    #[serde(default)]
    participants: bool,
    #[serde(default)]
    delete_failed: bool,
}

#[debug_handler]
pub(crate) async fn room(
    State(backend): State<SqliteBackend>,
    session: Session,
    Path(room_id): Path<String>,
    Query(RoomQuery { participants, delete_failed }): Query<RoomQuery>,
) -> AppResult<Response> {
    let auth = AuthContext::resolve(&session, &backend).await?;
    if auth.user().is_none() {
        return Ok(Redirect::to("/").into_response());
    }

    let Ok(room_id) = Uuid::parse_str(&room_id) else {
        return Ok(Redirect::to("/").into_response());
    };

    let Some(mut room) = RoomSession::enter(&backend, &auth, room_id).await else {
        return Ok(Redirect::to("/").into_response());
    };
    if participants {
        room.toggle_participants();
    }

    Ok(Html(room.render(delete_failed)).into_response())
}
