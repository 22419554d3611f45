use axum::{
    debug_handler,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::{IntoResponse, Response},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult,
    backend::{BackendError, SqliteBackend},
    models::Message,
    rooms::{
        msg::{self, MessageView},
        room::RoomSession,
    },
    session::AuthContext,
};

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    /// Last message the page rendered.
    after: Option<Uuid>,
}

/// Streams the room's message inserts to the page, rendered for the
/// connected viewer. Messages the page missed since `after` go first.
/// Closing the socket drops the subscription.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(room_id): Path<Uuid>,
    Query(WsQuery { after }): Query<WsQuery>,
    State(backend): State<SqliteBackend>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let auth = AuthContext::resolve(&session, &backend).await?;
    auth.require()?;

    let room = RoomSession::enter_live(&backend, &auth, room_id)
        .await
        .ok_or(BackendError::NotFound("room"))?;

    Ok(ws
        .on_upgrade(move |stream: WebSocket| {
            let (sender, receiver) = stream.split();
            forward_inserts(sender, receiver, room, after)
        })
        .into_response())
}

fn insert_payload(message: &Message, viewer: Option<Uuid>) -> String {
    serde_json::json!({
        "id": message.id,
        "html": msg::msg_to_html(MessageView::new(message, viewer)),
    })
    .to_string()
}

async fn forward_inserts<S, R, E>(
    mut sender: S,
    mut receiver: R,
    mut room: RoomSession,
    after: Option<Uuid>,
) where
    S: Sink<WsMessage> + Unpin,
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
{
    let room_id = room.room().id;
    let viewer = room.viewer().map(|user| user.id);

    let backlog: Vec<String> = room
        .messages_after(after)
        .iter()
        .map(|message| insert_payload(message, viewer))
        .collect();
    if !backlog.is_empty() {
        tracing::debug!(%room_id, count = backlog.len(), "replaying messages missed since render");
    }

    let mut open = true;
    for payload in backlog {
        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
            open = false;
            break;
        }
    }

    while open {
        let payload = tokio::select! {
            inserted = room.recv() => match inserted {
                Some(message) => insert_payload(message, viewer),
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
        };
        open = sender.send(WsMessage::Text(payload.into())).await.is_ok();
    }

    tracing::debug!(%room_id, "realtime connection closed");
    room.leave();
}

#[cfg(test)]
mod tests {
    use futures_util::{sink, stream};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        backend::Backend,
        models::{NewMessage, NewRoom, Room, User, Visibility},
    };

    async fn post(backend: &SqliteBackend, room: &Room, sender: &User, content: &str) -> Message {
        backend
            .insert_message(NewMessage {
                room_id: room.id,
                sender_id: sender.id,
                content: content.to_owned(),
            })
            .await
            .unwrap()
    }

    fn payload(text: WsMessage) -> serde_json::Value {
        match text {
            WsMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn payload_is_rendered_per_viewer() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let alice = backend.sign_in("alice", "alice@example.com").await.unwrap();
        let bob = backend.sign_in("bob", "bob@example.com").await.unwrap();
        let room = backend
            .insert_room(NewRoom {
                name: "lobby".to_owned(),
                visibility: Visibility::Public,
                category: None,
                max_participants: 50,
                creator_id: alice.id,
            })
            .await
            .unwrap();
        let message = post(&backend, &room, &alice, "hello").await;

        let for_bob: serde_json::Value =
            serde_json::from_str(&insert_payload(&message, Some(bob.id))).unwrap();
        assert_eq!(for_bob["id"], message.id.to_string());
        let html = for_bob["html"].as_str().unwrap();
        assert!(html.contains(r#"class="message theirs""#));
        assert!(html.contains(r#"<p class="sender">alice</p>"#));

        let for_alice: serde_json::Value =
            serde_json::from_str(&insert_payload(&message, Some(alice.id))).unwrap();
        let html = for_alice["html"].as_str().unwrap();
        assert!(html.contains(r#"class="message mine""#));
        assert!(!html.contains(r#"class="sender""#));
    }

    #[tokio::test]
    async fn replays_the_gap_then_streams_until_closed() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let alice = backend.sign_in("alice", "alice@example.com").await.unwrap();
        let bob = backend.sign_in("bob", "bob@example.com").await.unwrap();
        let room = backend
            .insert_room(NewRoom {
                name: "lobby".to_owned(),
                visibility: Visibility::Public,
                category: None,
                max_participants: 50,
                creator_id: alice.id,
            })
            .await
            .unwrap();

        // bob's page rendered up to `shown`; `missed` came in before the socket opened
        let shown = post(&backend, &room, &alice, "shown").await;
        let missed = post(&backend, &room, &alice, "missed").await;

        let auth = AuthContext::signed_in(bob.clone());
        let session = RoomSession::enter_live(&backend, &auth, room.id).await.unwrap();
        assert_eq!(backend.feed().subscriber_count(room.id), 1);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<WsMessage, axum::Error>>();
        let sender = Box::pin(sink::unfold(out_tx, |tx, frame: WsMessage| async move {
            tx.send(frame).map(|_| tx)
        }));
        let receiver = Box::pin(stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }));
        let task = tokio::spawn(forward_inserts(sender, receiver, session, Some(shown.id)));

        let first = payload(out_rx.recv().await.unwrap());
        assert_eq!(first["id"], missed.id.to_string());
        assert!(first["html"].as_str().unwrap().contains("missed"));
        assert!(first["html"].as_str().unwrap().contains(r#"class="message theirs""#));

        let live = post(&backend, &room, &alice, "live").await;
        let second = payload(out_rx.recv().await.unwrap());
        assert_eq!(second["id"], live.id.to_string());
        assert!(second["html"].as_str().unwrap().contains(r#"<p class="sender">alice</p>"#));

        in_tx.send(Ok(WsMessage::Close(None))).unwrap();
        task.await.unwrap();
        assert_eq!(backend.feed().subscriber_count(room.id), 0);
        assert!(out_rx.try_recv().is_err());
    }
}
