//! The storage and realtime seam every view talks through.

mod feed;
mod sqlite;

use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Message, NewMessage, NewRoom, Participant, Room, User};

pub use feed::{ChangeFeed, Subscription};
pub use sqlite::SqliteBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication required")]
    AuthRequired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("only the room creator can delete it")]
    NotCreator,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("malformed identifier: {0}")]
    Identifier(#[from] uuid::Error),
    #[error("malformed timestamp: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Authenticated CRUD over rooms, messages and participants, plus a per-room
/// insert feed for messages.
pub trait Backend: Clone + Send + Sync + 'static {
    fn sign_in(
        &self,
        username: &str,
        email: &str,
    ) -> impl Future<Output = BackendResult<User>> + Send;

    fn user(&self, id: Uuid) -> impl Future<Output = BackendResult<Option<User>>> + Send;

    fn public_rooms(&self) -> impl Future<Output = BackendResult<Vec<Room>>> + Send;

    fn room(&self, id: Uuid) -> impl Future<Output = BackendResult<Room>> + Send;

    fn insert_room(&self, room: NewRoom) -> impl Future<Output = BackendResult<Room>> + Send;

    fn delete_room(&self, id: Uuid) -> impl Future<Output = BackendResult<u64>> + Send;

    /// Visible messages of a room, oldest first.
    fn room_messages(
        &self,
        room_id: Uuid,
    ) -> impl Future<Output = BackendResult<Vec<Message>>> + Send;

    fn insert_message(
        &self,
        message: NewMessage,
    ) -> impl Future<Output = BackendResult<Message>> + Send;

    fn delete_room_messages(
        &self,
        room_id: Uuid,
    ) -> impl Future<Output = BackendResult<u64>> + Send;

    fn room_participants(
        &self,
        room_id: Uuid,
    ) -> impl Future<Output = BackendResult<Vec<Participant>>> + Send;

    fn find_participant(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = BackendResult<Option<Uuid>>> + Send;

    fn insert_participant(
        &self,
        room_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = BackendResult<Uuid>> + Send;

    fn subscribe_messages(&self, room_id: Uuid) -> Subscription;
}
