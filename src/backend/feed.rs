use std::{
    collections::HashMap,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::Message;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, (Uuid, mpsc::UnboundedSender<Message>)>,
}

/// Fan-out of message inserts to per-room subscribers.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeFeed {
    pub fn subscribe(&self, room_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, (room_id, tx));
        tracing::debug!(subscription = id, %room_id, "subscribed to message inserts");

        Subscription {
            id,
            room_id,
            rx,
            feed: self.clone(),
        }
    }

    pub fn publish(&self, message: &Message) {
        let mut registry = self.registry.lock();
        registry.subscribers.retain(|id, (room_id, tx)| {
            if *room_id != message.room_id {
                return true;
            }
            if tx.send(message.clone()).is_err() {
                tracing::debug!(subscription = id, "dropping closed subscriber");
                return false;
            }
            true
        });
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.registry
            .lock()
            .subscribers
            .values()
            .filter(|(r, _)| *r == room_id)
            .count()
    }

    fn remove(&self, id: u64) {
        self.registry.lock().subscribers.remove(&id);
    }
}

/// Insert events for one room, in publish order. Ends only when detached;
/// once detached it cannot be resumed.
pub struct Subscription {
    id: u64,
    room_id: Uuid,
    rx: mpsc::UnboundedReceiver<Message>,
    feed: ChangeFeed,
}

impl Subscription {
    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        tracing::debug!(subscription = self.id, room_id = %self.room_id, "unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.feed.remove(self.id);
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use time::OffsetDateTime;

    use super::*;

    fn message(room_id: Uuid, content: &str) -> Message {
        Message {
            id: Uuid::now_v7(),
            room_id,
            sender_id: Uuid::now_v7(),
            content: content.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            is_deleted: false,
            sender: None,
        }
    }

    #[tokio::test]
    async fn delivers_only_matching_room_in_order() {
        let feed = ChangeFeed::default();
        let room = Uuid::now_v7();
        let other = Uuid::now_v7();
        let mut sub = feed.subscribe(room);
        assert_eq!(sub.room_id(), room);

        feed.publish(&message(room, "one"));
        feed.publish(&message(other, "elsewhere"));
        feed.publish(&message(room, "two"));

        assert_eq!(sub.recv().await.unwrap().content, "one");
        assert_eq!(sub.recv().await.unwrap().content, "two");
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_detaches() {
        let feed = ChangeFeed::default();
        let room = Uuid::now_v7();
        let sub = feed.subscribe(room);
        let kept = feed.subscribe(room);
        assert_eq!(feed.subscriber_count(room), 2);

        sub.unsubscribe();
        assert_eq!(feed.subscriber_count(room), 1);

        drop(kept);
        assert_eq!(feed.subscriber_count(room), 0);
        feed.publish(&message(room, "nobody listening"));
    }

    #[tokio::test]
    async fn works_as_stream() {
        let feed = ChangeFeed::default();
        let room = Uuid::now_v7();
        let sub = feed.subscribe(room);
        for i in 0..3 {
            feed.publish(&message(room, &i.to_string()));
        }

        let got: Vec<String> = sub.take(3).map(|m| m.content).collect().await;
        assert_eq!(got, ["0", "1", "2"]);
    }
}
