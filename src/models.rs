use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        use Visibility::*;
        match self {
            Public => "public",
            Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Visibility> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Sender or participant details joined in from `users`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub visibility: Visibility,
    pub category: Option<String>,
    pub max_participants: u32,
    pub creator_id: Uuid,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub name: String,
    pub visibility: Visibility,
    pub category: Option<String>,
    pub max_participants: u32,
    pub creator_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub is_deleted: bool,
    pub sender: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub user: Option<UserProfile>,
}

impl Participant {
    pub fn display_name(&self) -> &str {
        match &self.user {
            Some(user) if !user.username.is_empty() => &user.username,
            _ => "Unknown",
        }
    }

    /// First character of the username, uppercased, or `?`.
    pub fn avatar_glyph(&self) -> String {
        self.user
            .as_ref()
            .and_then(|user| user.username.chars().next())
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_else(|| "?".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(username: Option<&str>) -> Participant {
        Participant {
            id: Uuid::now_v7(),
            room_id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            user: username.map(|username| UserProfile {
                username: username.to_owned(),
                email: "someone@example.com".to_owned(),
            }),
        }
    }

    #[test]
    fn avatar_glyph_uppercases_first_char() {
        assert_eq!(participant(Some("alice")).avatar_glyph(), "A");
        assert_eq!(participant(Some("ßeta")).avatar_glyph(), "SS");
        assert_eq!(participant(Some("雑談")).avatar_glyph(), "雑");
    }

    #[test]
    fn missing_user_falls_back() {
        assert_eq!(participant(None).avatar_glyph(), "?");
        assert_eq!(participant(None).display_name(), "Unknown");
        assert_eq!(participant(Some("")).avatar_glyph(), "?");
        assert_eq!(participant(Some("")).display_name(), "Unknown");
    }

    #[test]
    fn visibility_round_trips_through_str() {
        assert_eq!(Visibility::parse("private"), Some(Visibility::Private));
        assert_eq!(Visibility::parse("secret"), None);
        assert_eq!(Visibility::default().to_string(), "public");
    }
}
