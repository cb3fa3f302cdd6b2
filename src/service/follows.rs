// Follow service
//
// A follow edge is stored on both sides: follower.following and
// followed.followers. Self-follow, duplicate follow and duplicate unfollow
// are rejected.

use crate::node::CoordinationContext;
use crate::replication::event::ReplicationEvent;
use crate::service::dispatcher::ActionHandler;
use crate::service::request::{error_reply, ok_reply, ok_with, ClientRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const ACTIONS: &[&str] = &[
    "FOLLOW_USER",
    "UNFOLLOW_USER",
    "GET_FOLLOWERS",
    "GET_FOLLOWING",
];

pub struct FollowHandler {
    ctx: Arc<CoordinationContext>,
}

impl FollowHandler {
    pub fn new(ctx: Arc<CoordinationContext>) -> Self {
        Self { ctx }
    }

    fn follow(&self, follower_username: String, followed_username: String) -> Value {
        if follower_username.eq_ignore_ascii_case(&followed_username) {
            return error_reply("cannot follow yourself");
        }
        let Some(mut follower) = self.ctx.users.get(&follower_username) else {
            return error_reply(format!("user '{}' not found", follower_username));
        };
        let Some(mut followed) = self.ctx.users.get(&followed_username) else {
            return error_reply(format!("user '{}' not found", followed_username));
        };
        if follower.following.contains(&followed.username) {
            return error_reply(format!(
                "'{}' already follows '{}'",
                follower.username, followed.username
            ));
        }

        follower.following.insert(followed.username.clone());
        followed.followers.insert(follower.username.clone());
        let follower_name = follower.username.clone();
        let followed_name = followed.username.clone();
        match self.ctx.users.update_pair(follower, followed) {
            Ok(()) => {
                self.ctx.queue.enqueue(ReplicationEvent::follow_added(
                    &follower_name,
                    &followed_name,
                    self.ctx.physical.now_millis(),
                ));
                ok_reply()
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn unfollow(&self, follower_username: String, followed_username: String) -> Value {
        let Some(mut follower) = self.ctx.users.get(&follower_username) else {
            return error_reply(format!("user '{}' not found", follower_username));
        };
        let Some(mut followed) = self.ctx.users.get(&followed_username) else {
            return error_reply(format!("user '{}' not found", followed_username));
        };
        if !follower.following.contains(&followed.username) {
            return error_reply(format!(
                "'{}' does not follow '{}'",
                follower.username, followed.username
            ));
        }

        follower.following.remove(&followed.username);
        followed.followers.remove(&follower.username);
        let follower_name = follower.username.clone();
        let followed_name = followed.username.clone();
        match self.ctx.users.update_pair(follower, followed) {
            Ok(()) => {
                self.ctx.queue.enqueue(ReplicationEvent::follow_removed(
                    &follower_name,
                    &followed_name,
                    self.ctx.physical.now_millis(),
                ));
                ok_reply()
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn followers(&self, username: String) -> Value {
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };
        let followers: Vec<&String> = user.followers.iter().collect();
        ok_with(json!({ "count": followers.len(), "followers": followers }))
    }

    fn following(&self, username: String) -> Value {
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };
        let following: Vec<&String> = user.following.iter().collect();
        ok_with(json!({ "count": following.len(), "following": following }))
    }
}

#[async_trait]
impl ActionHandler for FollowHandler {
    fn name(&self) -> &'static str {
        "follow"
    }

    fn handles(&self, action: &str) -> bool {
        ACTIONS.contains(&action)
    }

    async fn dispatch(&self, request: ClientRequest) -> Value {
        match request {
            ClientRequest::FollowUser {
                follower_username,
                followed_username,
            } => self.follow(follower_username, followed_username),
            ClientRequest::UnfollowUser {
                follower_username,
                followed_username,
            } => self.unfollow(follower_username, followed_username),
            ClientRequest::GetFollowers { username } => self.followers(username),
            ClientRequest::GetFollowing { username } => self.following(username),
            _ => error_reply("action not served on this port"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::event::EventType;
    use crate::repository::User;

    fn handler() -> (FollowHandler, Arc<CoordinationContext>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CoordinationContext::standalone("b1", dir.path()).unwrap();
        ctx.users.add(User::new("alice", "pw", 1)).unwrap();
        ctx.users.add(User::new("bob", "pw", 1)).unwrap();
        (FollowHandler::new(Arc::clone(&ctx)), ctx, dir)
    }

    #[tokio::test]
    async fn test_follow_symmetry_and_unfollow() {
        let (handler, ctx, _dir) = handler();
        let reply = handler
            .dispatch(ClientRequest::FollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;
        assert_eq!(reply["success"], true);
        assert_eq!(ctx.queue.pop().unwrap().event_type, EventType::FollowAdded);

        let alice = ctx.users.get("alice").unwrap();
        let bob = ctx.users.get("bob").unwrap();
        assert!(alice.following.contains("bob"));
        assert!(bob.followers.contains("alice"));

        let reply = handler
            .dispatch(ClientRequest::UnfollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;
        assert_eq!(reply["success"], true);
        assert_eq!(ctx.queue.pop().unwrap().event_type, EventType::FollowRemoved);

        let alice = ctx.users.get("alice").unwrap();
        let bob = ctx.users.get("bob").unwrap();
        assert!(!alice.following.contains("bob"));
        assert!(!bob.followers.contains("alice"));
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let (handler, ctx, _dir) = handler();
        let reply = handler
            .dispatch(ClientRequest::FollowUser {
                follower_username: "alice".into(),
                followed_username: "Alice".into(),
            })
            .await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "cannot follow yourself");
        assert!(ctx.queue.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_follow_and_unfollow_rejected() {
        let (handler, ctx, _dir) = handler();
        handler
            .dispatch(ClientRequest::FollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;
        ctx.queue.pop();

        let reply = handler
            .dispatch(ClientRequest::FollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;
        assert_eq!(reply["success"], false);
        assert!(ctx.queue.is_empty());

        handler
            .dispatch(ClientRequest::UnfollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;
        ctx.queue.pop();

        let reply = handler
            .dispatch(ClientRequest::UnfollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;
        assert_eq!(reply["success"], false);
        assert!(ctx.queue.is_empty());
    }

    #[tokio::test]
    async fn test_follower_listings() {
        let (handler, _ctx, _dir) = handler();
        handler
            .dispatch(ClientRequest::FollowUser {
                follower_username: "alice".into(),
                followed_username: "bob".into(),
            })
            .await;

        let reply = handler
            .dispatch(ClientRequest::GetFollowers {
                username: "bob".into(),
            })
            .await;
        assert_eq!(reply["count"], 1);
        assert_eq!(reply["followers"][0], "alice");

        let reply = handler
            .dispatch(ClientRequest::GetFollowing {
                username: "alice".into(),
            })
            .await;
        assert_eq!(reply["count"], 1);
        assert_eq!(reply["following"][0], "bob");
    }

    #[tokio::test]
    async fn test_unknown_users_rejected() {
        let (handler, _ctx, _dir) = handler();
        let reply = handler
            .dispatch(ClientRequest::FollowUser {
                follower_username: "alice".into(),
                followed_username: "ghost".into(),
            })
            .await;
        assert_eq!(reply["success"], false);
    }
}
