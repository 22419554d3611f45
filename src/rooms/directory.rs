use crate::{
    backend::Backend,
    include_res,
    models::Room,
    res,
};

/// Public rooms, newest first.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
}

impl RoomDirectory {
    pub async fn load<B: Backend>(backend: &B) -> RoomDirectory {
        let mut directory = RoomDirectory::default();
        directory.refresh(backend).await;
        directory
    }

    /// Refetches the whole list. On failure the current list is kept.
    pub async fn refresh<B: Backend>(&mut self, backend: &B) {
        match backend.public_rooms().await {
            Ok(rooms) => self.rooms = rooms,
            Err(err) => tracing::error!("failed to fetch rooms: {err}"),
        }
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn render(&self) -> String {
        if self.rooms.is_empty() {
            return include_res!(str, "/pages/no_rooms.html").to_owned();
        }

        self.rooms.iter().map(room_card).collect()
    }
}

fn room_card(room: &Room) -> String {
    let category_badge = match &room.category {
        Some(category) => format!(r#"<span class="badge">{}</span>"#, res::escape(category)),
        None => String::new(),
    };

    include_res!(str, "/pages/room_item.html")
        .replace("{id}", &room.id.to_string())
        .replace("{name}", &res::escape(&room.name))
        .replace("{category_badge}", &category_badge)
        .replace("{max_participants}", &room.max_participants.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::SqliteBackend, models::{NewRoom, Visibility}};

    #[tokio::test]
    async fn lists_public_rooms_only() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let alice = backend.sign_in("alice", "alice@example.com").await.unwrap();
        for (name, visibility) in [("open", Visibility::Public), ("secret", Visibility::Private)] {
            backend
                .insert_room(NewRoom {
                    name: name.to_owned(),
                    visibility,
                    category: Some("games".to_owned()),
                    max_participants: 10,
                    creator_id: alice.id,
                })
                .await
                .unwrap();
        }

        let directory = RoomDirectory::load(&backend).await;
        let names: Vec<&str> = directory.rooms().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["open"]);

        let html = directory.render();
        assert!(html.contains("open"));
        assert!(!html.contains("secret"));
        assert!(html.contains(r#"<span class="badge">games</span>"#));
        assert!(html.contains("max 10"));
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_empty() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        backend.close().await;

        let directory = RoomDirectory::load(&backend).await;
        assert!(directory.rooms().is_empty());
        assert!(directory.render().contains("No rooms yet"));
    }
}
