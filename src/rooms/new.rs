use axum::{
    Form, debug_handler,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::num::IntErrorKind;

use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    AppResult,
    backend::{Backend, SqliteBackend},
    include_res,
    models::{NewRoom, Room, Visibility},
    res,
    session::AuthContext,
};

pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 1000;
pub const DEFAULT_PARTICIPANTS: u32 = 50;

/// Form state for creating a room. Stays open with an inline error until a
/// create succeeds.
#[derive(Debug, Clone)]
pub struct CreationDialog {
    pub name: String,
    pub visibility: Visibility,
    pub category: String,
    max_participants: u32,
    error: Option<String>,
    open: bool,
}

impl Default for CreationDialog {
    fn default() -> Self {
        CreationDialog {
            name: String::new(),
            visibility: Visibility::Public,
            category: String::new(),
            max_participants: DEFAULT_PARTICIPANTS,
            error: None,
            open: true,
        }
    }
}

impl CreationDialog {
    pub fn max_participants(&self) -> u32 {
        self.max_participants
    }

    pub fn set_max_participants(&mut self, requested: i64) {
        self.max_participants =
            requested.clamp(MIN_PARTICIPANTS as i64, MAX_PARTICIPANTS as i64) as u32;
    }

    /// Applies the capacity field as typed. Blank keeps the default and
    /// out-of-range numbers are clamped; anything else leaves an inline error.
    pub fn set_max_participants_input(&mut self, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            self.max_participants = DEFAULT_PARTICIPANTS;
            return true;
        }

        match raw.parse::<i64>() {
            Ok(requested) => self.set_max_participants(requested),
            Err(err) => match err.kind() {
                IntErrorKind::PosOverflow => self.max_participants = MAX_PARTICIPANTS,
                IntErrorKind::NegOverflow => self.max_participants = MIN_PARTICIPANTS,
                _ => {
                    self.error = Some("max participants must be a whole number".to_owned());
                    return false;
                }
            },
        }
        true
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Creates the room as the current identity. `on_created` runs before the
    /// dialog closes; the directory hooks its refetch in there.
    pub async fn submit<B: Backend>(
        &mut self,
        backend: &B,
        auth: &AuthContext,
        on_created: impl AsyncFnOnce(&Room),
    ) -> Option<Room> {
        self.error = None;

        let name = self.name.trim();
        if name.is_empty() {
            self.error = Some("room name is required".to_owned());
            return None;
        }

        let creator = match auth.require() {
            Ok(user) => user,
            Err(err) => {
                self.error = Some(err.to_string());
                return None;
            }
        };

        let category = self.category.trim();
        let room = NewRoom {
            name: name.to_owned(),
            visibility: self.visibility,
            category: (!category.is_empty()).then(|| category.to_owned()),
            max_participants: self.max_participants,
            creator_id: creator.id,
        };

        match backend.insert_room(room).await {
            Ok(room) => {
                tracing::info!(room_id = %room.id, name = %room.name, "created room");
                on_created(&room).await;
                self.close();
                Some(room)
            }
            Err(err) => {
                tracing::error!("failed to create room: {err}");
                self.error = Some(err.to_string());
                None
            }
        }
    }

    pub fn render(&self) -> String {
        let (public_selected, private_selected) = match self.visibility {
            Visibility::Public => ("selected", ""),
            Visibility::Private => ("", "selected"),
        };
        let error = match &self.error {
            Some(error) => format!(r#"<div class="error">{}</div>"#, res::escape(error)),
            None => String::new(),
        };

        include_res!(str, "/pages/new_room.html")
            .replace("{name}", &res::escape(&self.name))
            .replace("{public_selected}", public_selected)
            .replace("{private_selected}", private_selected)
            .replace("{category}", &res::escape(&self.category))
            .replace("{min_participants}", &MIN_PARTICIPANTS.to_string())
            .replace("{max_participants_limit}", &MAX_PARTICIPANTS.to_string())
            .replace("{max_participants}", &self.max_participants.to_string())
            .replace("{error}", &error)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct NewRoomQuery {
    name: String,
    visibility: String,
    category: String,
    max_participants: String,
}

#[debug_handler]
pub(crate) async fn new_room_page(
    State(backend): State<SqliteBackend>,
    session: Session,
) -> AppResult<Response> {
    if AuthContext::resolve(&session, &backend).await?.user().is_none() {
        return Ok(Redirect::to("/").into_response());
    }

    Ok(Html(CreationDialog::default().render()).into_response())
}

#[debug_handler]
pub(crate) async fn new_room(
    State(backend): State<SqliteBackend>,
    session: Session,

    Form(NewRoomQuery { name, visibility, category, max_participants }): Form<NewRoomQuery>,
) -> AppResult<Response> {
    let auth = AuthContext::resolve(&session, &backend).await?;

    let mut dialog = CreationDialog {
        name,
        visibility: Visibility::parse(visibility.trim()).unwrap_or_default(),
        category,
        ..CreationDialog::default()
    };

    // the directory refetches when it is rendered after the redirect
    if dialog.set_max_participants_input(&max_participants)
        && dialog.submit(&backend, &auth, async |_: &Room| {}).await.is_some()
    {
        return Ok(Redirect::to("/").into_response());
    }

    Ok((StatusCode::UNPROCESSABLE_ENTITY, Html(dialog.render())).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::SqliteBackend, rooms::RoomDirectory};

    #[test]
    fn defaults_and_clamping() {
        let mut dialog = CreationDialog::default();
        assert_eq!(dialog.visibility, Visibility::Public);
        assert_eq!(dialog.max_participants(), 50);
        assert!(dialog.is_open());

        dialog.set_max_participants(1);
        assert_eq!(dialog.max_participants(), 2);
        dialog.set_max_participants(100_000);
        assert_eq!(dialog.max_participants(), 1000);
        dialog.set_max_participants(-5);
        assert_eq!(dialog.max_participants(), 2);
    }

    #[test]
    fn capacity_field_is_parsed_leniently() {
        let mut dialog = CreationDialog::default();
        dialog.set_max_participants(10);

        assert!(dialog.set_max_participants_input("  "));
        assert_eq!(dialog.max_participants(), DEFAULT_PARTICIPANTS);
        assert!(dialog.set_max_participants_input(" 12 "));
        assert_eq!(dialog.max_participants(), 12);
        assert!(dialog.set_max_participants_input("99999999999999999999999"));
        assert_eq!(dialog.max_participants(), MAX_PARTICIPANTS);
        assert!(dialog.error().is_none());

        assert!(!dialog.set_max_participants_input("lots"));
        assert_eq!(dialog.error(), Some("max participants must be a whole number"));
        assert_eq!(dialog.max_participants(), MAX_PARTICIPANTS);
        assert!(dialog.render().contains("max participants must be a whole number"));
    }

    #[tokio::test]
    async fn requires_authentication() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let mut dialog = CreationDialog {
            name: "general".to_owned(),
            ..CreationDialog::default()
        };

        let created = dialog.submit(&backend, &AuthContext::anonymous(), async |_: &Room| {}).await;
        assert!(created.is_none());
        assert_eq!(dialog.error(), Some("authentication required"));
        assert!(dialog.is_open());
        assert!(backend.public_rooms().await.unwrap().is_empty());
        assert!(dialog.render().contains("authentication required"));
    }

    #[tokio::test]
    async fn blank_name_is_rejected_without_write() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let alice = backend.sign_in("alice", "alice@example.com").await.unwrap();
        let mut dialog = CreationDialog {
            name: "   ".to_owned(),
            ..CreationDialog::default()
        };

        let auth = AuthContext::signed_in(alice);
        assert!(dialog.submit(&backend, &auth, async |_: &Room| {}).await.is_none());
        assert!(dialog.error().is_some());
        assert!(backend.public_rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_refreshes_directory_and_closes() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let alice = backend.sign_in("alice", "alice@example.com").await.unwrap();
        let auth = AuthContext::signed_in(alice.clone());
        let mut directory = RoomDirectory::load(&backend).await;
        assert!(directory.rooms().is_empty());

        let mut dialog = CreationDialog {
            name: "雑談".to_owned(),
            ..CreationDialog::default()
        };
        let room = dialog
            .submit(&backend, &auth, async |_: &Room| directory.refresh(&backend).await)
            .await
            .unwrap();

        assert!(!dialog.is_open());
        assert_eq!(dialog.error(), None);
        assert_eq!(room.creator_id, alice.id);
        assert_eq!(room.category, None);
        assert_eq!(room.max_participants, 50);

        assert_eq!(directory.rooms().len(), 1);
        assert_eq!(directory.rooms()[0].name, "雑談");
        assert!(!directory.render().contains("badge"));
    }

    #[tokio::test]
    async fn insert_failure_stays_open_for_retry() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let alice = backend.sign_in("alice", "alice@example.com").await.unwrap();
        let auth = AuthContext::signed_in(alice);
        let mut dialog = CreationDialog {
            name: "later".to_owned(),
            ..CreationDialog::default()
        };
        backend.close().await;

        assert!(dialog.submit(&backend, &auth, async |_: &Room| {}).await.is_none());
        assert!(dialog.is_open());
        assert!(dialog.error().unwrap().starts_with("database error"));
    }
}
