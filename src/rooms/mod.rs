mod delete;
mod directory;
mod msg;
mod new;
mod room;
mod ws;

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub use delete::{DeleteOutcome, delete_room};
pub use directory::RoomDirectory;
pub use msg::{MessageView, send_message};
pub use new::{CreationDialog, DEFAULT_PARTICIPANTS, MAX_PARTICIPANTS, MIN_PARTICIPANTS};
pub use room::{RoomSession, join_room};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms/new", get(new::new_room_page).post(new::new_room))
        .route("/room/{room_id}", get(room::room))
        .route("/room/{room_id}/messages", post(msg::send_msg))
        .route("/room/{room_id}/delete", post(delete::delete_room_handler))
        .route("/room/{room_id}/ws", get(ws::room_ws))
}
