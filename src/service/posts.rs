// Post service: authoring, timeline and feed reads
//
// Only the author may update or delete a post. The feed covers the user's
// own posts plus everyone they follow, newest first.

use crate::node::CoordinationContext;
use crate::replication::event::ReplicationEvent;
use crate::repository::Post;
use crate::service::dispatcher::ActionHandler;
use crate::service::request::{error_reply, ok_reply, ok_with, post_json, ClientRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const ACTIONS: &[&str] = &[
    "CREATE_POST",
    "UPDATE_POST",
    "DELETE_POST",
    "GET_USER_POSTS",
    "GET_FEED",
];

const DEFAULT_FEED_LIMIT: usize = 50;

pub struct PostHandler {
    ctx: Arc<CoordinationContext>,
}

impl PostHandler {
    pub fn new(ctx: Arc<CoordinationContext>) -> Self {
        Self { ctx }
    }

    fn create(&self, username: String, content: String) -> Value {
        if content.trim().is_empty() {
            return error_reply("content must not be empty");
        }
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };

        let post = Post::new(user.username, content, self.ctx.physical.now_millis());
        match self.ctx.posts.add(post.clone()) {
            Ok(()) => {
                self.ctx
                    .queue
                    .enqueue(ReplicationEvent::post_created(&post, post.created_at));
                ok_with(json!({
                    "postId": post.post_id,
                    "username": post.username,
                    "createdAt": post.created_at,
                }))
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn update(&self, post_id: String, username: String, content: String) -> Value {
        let Ok(post_id) = Uuid::parse_str(&post_id) else {
            return error_reply(format!("invalid post id '{}'", post_id));
        };
        if content.trim().is_empty() {
            return error_reply("content must not be empty");
        }
        let Some(mut post) = self.ctx.posts.get_by_id(post_id) else {
            return error_reply(format!("post {} not found", post_id));
        };
        if !post.username.eq_ignore_ascii_case(&username) {
            return error_reply("only the author may update a post");
        }

        post.content = content;
        post.updated_at = self.ctx.physical.now_millis().max(post.created_at);
        match self.ctx.posts.update(post.clone()) {
            Ok(()) => {
                self.ctx
                    .queue
                    .enqueue(ReplicationEvent::post_updated(&post, post.updated_at));
                ok_with(json!({
                    "postId": post.post_id,
                    "updatedAt": post.updated_at,
                }))
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn delete(&self, post_id: String, username: String) -> Value {
        let Ok(post_id) = Uuid::parse_str(&post_id) else {
            return error_reply(format!("invalid post id '{}'", post_id));
        };
        let Some(post) = self.ctx.posts.get_by_id(post_id) else {
            return error_reply(format!("post {} not found", post_id));
        };
        if !post.username.eq_ignore_ascii_case(&username) {
            return error_reply("only the author may delete a post");
        }

        match self.ctx.posts.remove(post_id) {
            Ok(_) => {
                self.ctx.queue.enqueue(ReplicationEvent::post_deleted(
                    post_id,
                    &post.username,
                    self.ctx.physical.now_millis(),
                ));
                ok_reply()
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn user_posts(&self, username: String) -> Value {
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };
        let posts: Vec<Value> = self
            .ctx
            .posts
            .get_by_username(&user.username)
            .iter()
            .map(post_json)
            .collect();
        ok_with(json!({ "count": posts.len(), "posts": posts }))
    }

    fn feed(&self, username: String, limit: Option<usize>) -> Value {
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };
        let mut authors: Vec<String> = user.following.iter().cloned().collect();
        authors.push(user.username.clone());

        let limit = limit.unwrap_or(DEFAULT_FEED_LIMIT);
        let posts: Vec<Value> = self
            .ctx
            .posts
            .get_recent_by_users(&authors, limit)
            .iter()
            .map(post_json)
            .collect();
        ok_with(json!({ "count": posts.len(), "posts": posts }))
    }
}

#[async_trait]
impl ActionHandler for PostHandler {
    fn name(&self) -> &'static str {
        "posts"
    }

    fn handles(&self, action: &str) -> bool {
        ACTIONS.contains(&action)
    }

    async fn dispatch(&self, request: ClientRequest) -> Value {
        match request {
            ClientRequest::CreatePost { username, content } => self.create(username, content),
            ClientRequest::UpdatePost {
                post_id,
                username,
                content,
            } => self.update(post_id, username, content),
            ClientRequest::DeletePost { post_id, username } => self.delete(post_id, username),
            ClientRequest::GetUserPosts { username } => self.user_posts(username),
            ClientRequest::GetFeed { username, limit } => self.feed(username, limit),
            _ => error_reply("action not served on this port"),
        }
    }
}
