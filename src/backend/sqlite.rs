use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{Message, NewMessage, NewRoom, Participant, Room, User, UserProfile, Visibility};

use super::{Backend, BackendError, BackendResult, ChangeFeed, Subscription};

/// sqlx-backed store with an in-process insert feed for messages.
#[derive(Clone)]
pub struct SqliteBackend {
    db_pool: SqlitePool,
    feed: ChangeFeed,
}

impl SqliteBackend {
    pub async fn connect(database_url: &str, max_connections: u32) -> BackendResult<SqliteBackend> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db_pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Self::from_pool(db_pool).await
    }

    /// Single-connection in-memory database, kept alive for the pool's lifetime.
    pub async fn in_memory() -> BackendResult<SqliteBackend> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(db_pool).await
    }

    async fn from_pool(db_pool: SqlitePool) -> BackendResult<SqliteBackend> {
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        Ok(SqliteBackend {
            db_pool,
            feed: ChangeFeed::default(),
        })
    }

    #[cfg(test)]
    pub(crate) fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub async fn close(&self) {
        self.db_pool.close().await;
    }
}

fn now_micros() -> i64 {
    to_micros(OffsetDateTime::now_utc())
}

fn to_micros(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000) as i64
}

fn from_micros(micros: i64) -> BackendResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(micros as i128 * 1_000)?)
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
}

impl TryFrom<UserRow> for User {
    type Error = BackendError;

    fn try_from(row: UserRow) -> BackendResult<User> {
        Ok(User {
            id: Uuid::parse_str(&row.id)?,
            username: row.username,
            email: row.email,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: String,
    name: String,
    #[sqlx(rename = "type")]
    visibility: String,
    category: Option<String>,
    max_participants: i64,
    creator_id: String,
    created_at: i64,
}

impl TryFrom<RoomRow> for Room {
    type Error = BackendError;

    fn try_from(row: RoomRow) -> BackendResult<Room> {
        Ok(Room {
            id: Uuid::parse_str(&row.id)?,
            name: row.name,
            // the CHECK constraint only admits the two known values
            visibility: Visibility::parse(&row.visibility).unwrap_or(Visibility::Private),
            category: row.category,
            max_participants: row.max_participants.clamp(0, u32::MAX as i64) as u32,
            creator_id: Uuid::parse_str(&row.creator_id)?,
            created_at: from_micros(row.created_at)?,
        })
    }
}

fn joined_profile(username: Option<String>, email: Option<String>) -> Option<UserProfile> {
    Some(UserProfile {
        username: username?,
        email: email?,
    })
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    room_id: String,
    sender_id: String,
    content: String,
    created_at: i64,
    is_deleted: bool,
    username: Option<String>,
    email: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = BackendError;

    fn try_from(row: MessageRow) -> BackendResult<Message> {
        Ok(Message {
            id: Uuid::parse_str(&row.id)?,
            room_id: Uuid::parse_str(&row.room_id)?,
            sender_id: Uuid::parse_str(&row.sender_id)?,
            content: row.content,
            created_at: from_micros(row.created_at)?,
            is_deleted: row.is_deleted,
            sender: joined_profile(row.username, row.email),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: String,
    room_id: String,
    user_id: String,
    username: Option<String>,
    email: Option<String>,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = BackendError;

    fn try_from(row: ParticipantRow) -> BackendResult<Participant> {
        Ok(Participant {
            id: Uuid::parse_str(&row.id)?,
            room_id: Uuid::parse_str(&row.room_id)?,
            user_id: Uuid::parse_str(&row.user_id)?,
            user: joined_profile(row.username, row.email),
        })
    }
}

const ROOM_COLUMNS: &str = "id,name,type,category,max_participants,creator_id,created_at";

const MESSAGE_SELECT: &str = r#"
    SELECT m.id,m.room_id,m.sender_id,m.content,m.created_at,m.is_deleted,u.username,u.email
    FROM messages m LEFT JOIN users u ON u.id = m.sender_id
"#;

impl Backend for SqliteBackend {
    async fn sign_in(&self, username: &str, email: &str) -> BackendResult<User> {
        sqlx::query(
            "INSERT INTO users (id,username,email,created_at) VALUES (?,?,?,?)
            ON CONFLICT(email) DO NOTHING",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(username)
        .bind(email)
        .bind(now_micros())
        .execute(&self.db_pool)
        .await?;

        sqlx::query_as::<_, UserRow>("SELECT id,username,email FROM users WHERE email=?")
            .bind(email)
            .fetch_one(&self.db_pool)
            .await?
            .try_into()
    }

    async fn user(&self, id: Uuid) -> BackendResult<Option<User>> {
        sqlx::query_as::<_, UserRow>("SELECT id,username,email FROM users WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn public_rooms(&self) -> BackendResult<Vec<Room>> {
        sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE type=?
            ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(Visibility::Public.as_str())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(Room::try_from)
        .collect()
    }

    async fn room(&self, id: Uuid) -> BackendResult<Room> {
        sqlx::query_as::<_, RoomRow>(&format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(BackendError::NotFound("room"))?
            .try_into()
    }

    async fn insert_room(&self, room: NewRoom) -> BackendResult<Room> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO chat_rooms (id,name,type,category,max_participants,creator_id,created_at)
            VALUES (?,?,?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(&room.name)
        .bind(room.visibility.as_str())
        .bind(&room.category)
        .bind(room.max_participants as i64)
        .bind(room.creator_id.to_string())
        .bind(to_micros(created_at))
        .execute(&self.db_pool)
        .await?;

        Ok(Room {
            id,
            name: room.name,
            visibility: room.visibility,
            category: room.category,
            max_participants: room.max_participants,
            creator_id: room.creator_id,
            created_at: from_micros(to_micros(created_at))?,
        })
    }

    async fn delete_room(&self, id: Uuid) -> BackendResult<u64> {
        Ok(sqlx::query("DELETE FROM chat_rooms WHERE id=?")
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected())
    }

    async fn room_messages(&self, room_id: Uuid) -> BackendResult<Vec<Message>> {
        sqlx::query_as::<_, MessageRow>(&format!(
            "{MESSAGE_SELECT} WHERE m.room_id=? AND m.is_deleted=FALSE
            ORDER BY m.created_at ASC, m.rowid ASC"
        ))
        .bind(room_id.to_string())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    async fn insert_message(&self, message: NewMessage) -> BackendResult<Message> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO messages (id,room_id,sender_id,content,created_at) VALUES (?,?,?,?,?)",
        )
        .bind(id.to_string())
        .bind(message.room_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(&message.content)
        .bind(now_micros())
        .execute(&self.db_pool)
        .await?;

        let inserted: Message =
            sqlx::query_as::<_, MessageRow>(&format!("{MESSAGE_SELECT} WHERE m.id=?"))
                .bind(id.to_string())
                .fetch_one(&self.db_pool)
                .await?
                .try_into()?;

        self.feed.publish(&inserted);
        Ok(inserted)
    }

    async fn delete_room_messages(&self, room_id: Uuid) -> BackendResult<u64> {
        Ok(sqlx::query("DELETE FROM messages WHERE room_id=?")
            .bind(room_id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected())
    }

    async fn room_participants(&self, room_id: Uuid) -> BackendResult<Vec<Participant>> {
        sqlx::query_as::<_, ParticipantRow>(
            r#"SELECT p.id,p.room_id,p.user_id,u.username,u.email
            FROM room_participants p LEFT JOIN users u ON u.id = p.user_id
            WHERE p.room_id=? ORDER BY p.joined_at ASC, p.rowid ASC"#,
        )
        .bind(room_id.to_string())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(Participant::try_from)
        .collect()
    }

    async fn find_participant(&self, room_id: Uuid, user_id: Uuid) -> BackendResult<Option<Uuid>> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM room_participants WHERE room_id=? AND user_id=?")
                .bind(room_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(&self.db_pool)
                .await?;

        match found {
            Some((id,)) => Ok(Some(Uuid::parse_str(&id)?)),
            None => Ok(None),
        }
    }

    async fn insert_participant(&self, room_id: Uuid, user_id: Uuid) -> BackendResult<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO room_participants (id,room_id,user_id,joined_at) VALUES (?,?,?,?)")
            .bind(id.to_string())
            .bind(room_id.to_string())
            .bind(user_id.to_string())
            .bind(now_micros())
            .execute(&self.db_pool)
            .await?;
        Ok(id)
    }

    fn subscribe_messages(&self, room_id: Uuid) -> Subscription {
        self.feed.subscribe(room_id)
    }
}
