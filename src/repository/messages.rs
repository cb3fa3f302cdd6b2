// Direct message repository

use crate::error::{FlockError, Result};
use crate::repository::store::SnapshotStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

const MESSAGES_FILE: &str = "messages.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub sender_username: String,
    pub receiver_username: String,
    pub content: String,
    pub sent_at: i64,
    pub read: bool,
    pub read_at: Option<i64>,
}

impl Message {
    pub fn new(
        sender_username: impl Into<String>,
        receiver_username: impl Into<String>,
        content: impl Into<String>,
        sent_at: i64,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            sender_username: sender_username.into(),
            receiver_username: receiver_username.into(),
            content: content.into(),
            sent_at,
            read: false,
            read_at: None,
        }
    }
}

pub struct MessageRepository {
    messages: Mutex<HashMap<Uuid, Message>>,
    store: SnapshotStore<HashMap<Uuid, Message>>,
}

impl MessageRepository {
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(directory.as_ref())?;
        let store = SnapshotStore::new(directory.as_ref().join(MESSAGES_FILE));
        let messages = store.load()?;
        Ok(Self {
            messages: Mutex::new(messages),
            store,
        })
    }

    pub fn add(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.lock();
        if messages.contains_key(&message.message_id) {
            return Err(FlockError::AlreadyExists(format!(
                "message {} already exists",
                message.message_id
            )));
        }
        messages.insert(message.message_id, message);
        self.store.save(&messages)
    }

    pub fn update(&self, message: Message) -> Result<()> {
        let mut messages = self.messages.lock();
        if !messages.contains_key(&message.message_id) {
            return Err(FlockError::NotFound(format!(
                "message {} not found",
                message.message_id
            )));
        }
        messages.insert(message.message_id, message);
        self.store.save(&messages)
    }

    pub fn get_by_id(&self, message_id: Uuid) -> Option<Message> {
        self.messages.lock().get(&message_id).cloned()
    }

    pub fn get_by_receiver(&self, username: &str) -> Vec<Message> {
        let needle = username.to_lowercase();
        let mut result: Vec<Message> = self
            .messages
            .lock()
            .values()
            .filter(|m| m.receiver_username.to_lowercase() == needle)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        result
    }

    pub fn get_unread_by_receiver(&self, username: &str) -> Vec<Message> {
        let needle = username.to_lowercase();
        let mut result: Vec<Message> = self
            .messages
            .lock()
            .values()
            .filter(|m| m.receiver_username.to_lowercase() == needle && !m.read)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        result
    }

    /// Both directions between two users, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str) -> Vec<Message> {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        let mut result: Vec<Message> = self
            .messages
            .lock()
            .values()
            .filter(|m| {
                let sender = m.sender_username.to_lowercase();
                let receiver = m.receiver_username.to_lowercase();
                (sender == a && receiver == b) || (sender == b && receiver == a)
            })
            .cloned()
            .collect();
        result.sort_by(|x, y| x.sent_at.cmp(&y.sent_at));
        result
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (MessageRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = MessageRepository::open(dir.path()).unwrap();
        (repo, dir)
    }

    #[test]
    fn test_conversation_is_bidirectional_and_ascending() {
        let (repo, _dir) = repo();
        repo.add(Message::new("alice", "bob", "hi", 100)).unwrap();
        repo.add(Message::new("bob", "alice", "hey", 200)).unwrap();
        repo.add(Message::new("alice", "carol", "psst", 150)).unwrap();

        let conversation = repo.get_conversation("bob", "alice");
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[0].content, "hi");
        assert_eq!(conversation[1].content, "hey");
    }

    #[test]
    fn test_unread_filter() {
        let (repo, _dir) = repo();
        let mut read_message = Message::new("alice", "bob", "seen", 100);
        read_message.read = true;
        read_message.read_at = Some(150);
        repo.add(read_message).unwrap();
        repo.add(Message::new("alice", "bob", "unseen", 200)).unwrap();

        let unread = repo.get_unread_by_receiver("bob");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].content, "unseen");
    }

    #[test]
    fn test_mark_read_via_update() {
        let (repo, _dir) = repo();
        let message = Message::new("alice", "bob", "hello", 100);
        let id = message.message_id;
        repo.add(message).unwrap();

        let mut loaded = repo.get_by_id(id).unwrap();
        loaded.read = true;
        loaded.read_at = Some(300);
        repo.update(loaded).unwrap();

        let reloaded = repo.get_by_id(id).unwrap();
        assert!(reloaded.read);
        assert_eq!(reloaded.read_at, Some(300));
    }
}
