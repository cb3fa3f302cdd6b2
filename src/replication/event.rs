// Replication events
//
// An event records one local mutation with enough payload to reconstruct it
// on a peer. The payload dictionaries use the same camelCase field names as
// the client-facing replies.

use crate::repository::{Message, Post, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    UserCreated,
    FollowAdded,
    FollowRemoved,
    PostCreated,
    PostUpdated,
    PostDeleted,
    MessageSent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationEvent {
    pub event_type: EventType,
    pub entity_id: String,
    /// Adjusted physical time at the origin, milliseconds
    pub timestamp: i64,
    pub data: serde_json::Value,
}

// Payload shapes per event type

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCreatedPayload {
    pub username: String,
    pub password: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowPayload {
    pub follower_username: String,
    pub followed_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub post_id: Uuid,
    pub username: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeletedPayload {
    pub post_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentPayload {
    pub message_id: Uuid,
    pub sender_username: String,
    pub receiver_username: String,
    pub content: String,
    pub sent_at: i64,
    pub read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<i64>,
}

impl ReplicationEvent {
    fn new(event_type: EventType, entity_id: String, timestamp: i64, data: serde_json::Value) -> Self {
        Self {
            event_type,
            entity_id,
            timestamp,
            data,
        }
    }

    pub fn user_created(user: &User, timestamp: i64) -> Self {
        let payload = UserCreatedPayload {
            username: user.username.clone(),
            password: user.password.clone(),
            created_at: user.created_at,
        };
        Self::new(
            EventType::UserCreated,
            user.username.clone(),
            timestamp,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    pub fn follow_added(follower: &str, followed: &str, timestamp: i64) -> Self {
        Self::follow(EventType::FollowAdded, follower, followed, timestamp)
    }

    pub fn follow_removed(follower: &str, followed: &str, timestamp: i64) -> Self {
        Self::follow(EventType::FollowRemoved, follower, followed, timestamp)
    }

    fn follow(event_type: EventType, follower: &str, followed: &str, timestamp: i64) -> Self {
        let payload = FollowPayload {
            follower_username: follower.to_string(),
            followed_username: followed.to_string(),
        };
        Self::new(
            event_type,
            format!("{}->{}", follower, followed),
            timestamp,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    pub fn post_created(post: &Post, timestamp: i64) -> Self {
        Self::post(EventType::PostCreated, post, timestamp)
    }

    pub fn post_updated(post: &Post, timestamp: i64) -> Self {
        Self::post(EventType::PostUpdated, post, timestamp)
    }

    fn post(event_type: EventType, post: &Post, timestamp: i64) -> Self {
        let payload = PostPayload {
            post_id: post.post_id,
            username: post.username.clone(),
            content: post.content.clone(),
            created_at: post.created_at,
            updated_at: post.updated_at,
        };
        Self::new(
            event_type,
            post.post_id.to_string(),
            timestamp,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    pub fn post_deleted(post_id: Uuid, username: &str, timestamp: i64) -> Self {
        let payload = PostDeletedPayload {
            post_id,
            username: username.to_string(),
        };
        Self::new(
            EventType::PostDeleted,
            post_id.to_string(),
            timestamp,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    pub fn message_sent(message: &Message, timestamp: i64) -> Self {
        let payload = MessageSentPayload {
            message_id: message.message_id,
            sender_username: message.sender_username.clone(),
            receiver_username: message.receiver_username.clone(),
            content: message.content.clone(),
            sent_at: message.sent_at,
            read: message.read,
            read_at: message.read_at,
        };
        Self::new(
            EventType::MessageSent,
            message.message_id.to_string(),
            timestamp,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }
}
