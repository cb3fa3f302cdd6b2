// Replication applier
//
// Consumes inbound DATA_REPLICATION events and applies them to the local
// repositories. Every branch is idempotent with respect to repeated
// delivery; an event whose prerequisites are missing is logged and
// dropped. The applier never emits events, so replication cannot cascade.

use crate::error::Result;
use crate::replication::event::{
    EventType, FollowPayload, MessageSentPayload, PostDeletedPayload, PostPayload,
    UserCreatedPayload,
};
use crate::repository::{Message, MessageRepository, Post, PostRepository, User, UserRepository};
use std::sync::Arc;

pub struct ReplicationApplier {
    users: Arc<UserRepository>,
    posts: Arc<PostRepository>,
    messages: Arc<MessageRepository>,
}

impl ReplicationApplier {
    pub fn new(
        users: Arc<UserRepository>,
        posts: Arc<PostRepository>,
        messages: Arc<MessageRepository>,
    ) -> Self {
        Self {
            users,
            posts,
            messages,
        }
    }

    pub fn apply(
        &self,
        source: &str,
        event_type: EventType,
        entity_id: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        tracing::debug!("applying {:?} for {} from {}", event_type, entity_id, source);
        match event_type {
            EventType::UserCreated => self.apply_user_created(data),
            EventType::FollowAdded => self.apply_follow(data, true),
            EventType::FollowRemoved => self.apply_follow(data, false),
            EventType::PostCreated => self.apply_post_created(data),
            EventType::PostUpdated => self.apply_post_updated(data),
            EventType::PostDeleted => self.apply_post_deleted(data),
            EventType::MessageSent => self.apply_message_sent(data),
        }
    }

    fn apply_user_created(&self, data: serde_json::Value) -> Result<()> {
        let payload: UserCreatedPayload = serde_json::from_value(data)?;
        if self.users.get(&payload.username).is_some() {
            tracing::debug!("user '{}' already present, skipping", payload.username);
            return Ok(());
        }
        self.users.add(User::new(
            payload.username,
            payload.password,
            payload.created_at,
        ))
    }

    fn apply_follow(&self, data: serde_json::Value, added: bool) -> Result<()> {
        let payload: FollowPayload = serde_json::from_value(data)?;
        let (Some(mut follower), Some(mut followed)) = (
            self.users.get(&payload.follower_username),
            self.users.get(&payload.followed_username),
        ) else {
            tracing::warn!(
                "dropping follow event {} -> {}: user missing locally",
                payload.follower_username,
                payload.followed_username
            );
            return Ok(());
        };

        let changed = if added {
            let a = follower.following.insert(followed.username.clone());
            let b = followed.followers.insert(follower.username.clone());
            a || b
        } else {
            let a = follower.following.remove(&followed.username);
            let b = followed.followers.remove(&follower.username);
            a || b
        };

        if changed {
            self.users.update_pair(follower, followed)?;
        }
        Ok(())
    }

    fn apply_post_created(&self, data: serde_json::Value) -> Result<()> {
        let payload: PostPayload = serde_json::from_value(data)?;
        if self.posts.get_by_id(payload.post_id).is_some() {
            tracing::debug!("post {} already present, skipping", payload.post_id);
            return Ok(());
        }
        self.posts.add(Post {
            post_id: payload.post_id,
            username: payload.username,
            content: payload.content,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
        })
    }

    fn apply_post_updated(&self, data: serde_json::Value) -> Result<()> {
        let payload: PostPayload = serde_json::from_value(data)?;
        let Some(mut post) = self.posts.get_by_id(payload.post_id) else {
            tracing::warn!("dropping update for unknown post {}", payload.post_id);
            return Ok(());
        };
        post.content = payload.content;
        post.updated_at = payload.updated_at;
        self.posts.update(post)
    }

    fn apply_post_deleted(&self, data: serde_json::Value) -> Result<()> {
        let payload: PostDeletedPayload = serde_json::from_value(data)?;
        let removed = self.posts.remove(payload.post_id)?;
        if !removed {
            tracing::debug!("post {} already absent", payload.post_id);
        }
        Ok(())
    }

    fn apply_message_sent(&self, data: serde_json::Value) -> Result<()> {
        let payload: MessageSentPayload = serde_json::from_value(data)?;
        if self.messages.get_by_id(payload.message_id).is_some() {
            tracing::debug!("message {} already present, skipping", payload.message_id);
            return Ok(());
        }
        self.messages.add(Message {
            message_id: payload.message_id,
            sender_username: payload.sender_username,
            receiver_username: payload.receiver_username,
            content: payload.content,
            sent_at: payload.sent_at,
            read: payload.read,
            read_at: payload.read_at,
        })
    }
}
