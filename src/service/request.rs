// Client action catalogue
//
// Requests are JSON dictionaries tagged by `action`. Unknown actions fail
// decoding and come back as an error reply. Replies always carry `success`
// and, on failure, `error`.

use crate::config::{FOLLOW_PORT_OFFSET, MESSAGES_PORT_OFFSET, POSTS_PORT_OFFSET, USERS_PORT_OFFSET};
use crate::repository::{Message, Post};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ClientRequest {
    #[serde(rename = "USER_REGISTER", alias = "register", rename_all = "camelCase")]
    UserRegister { username: String, password: String },

    #[serde(rename = "USER_LOGIN", rename_all = "camelCase")]
    UserLogin { username: String, password: String },

    #[serde(rename = "CREATE_POST", rename_all = "camelCase")]
    CreatePost { username: String, content: String },

    #[serde(rename = "UPDATE_POST", rename_all = "camelCase")]
    UpdatePost {
        post_id: String,
        username: String,
        content: String,
    },

    #[serde(rename = "DELETE_POST", rename_all = "camelCase")]
    DeletePost { post_id: String, username: String },

    #[serde(rename = "GET_USER_POSTS", rename_all = "camelCase")]
    GetUserPosts { username: String },

    #[serde(rename = "GET_FEED", rename_all = "camelCase")]
    GetFeed {
        username: String,
        limit: Option<usize>,
    },

    #[serde(rename = "FOLLOW_USER", rename_all = "camelCase")]
    FollowUser {
        follower_username: String,
        followed_username: String,
    },

    #[serde(rename = "UNFOLLOW_USER", rename_all = "camelCase")]
    UnfollowUser {
        follower_username: String,
        followed_username: String,
    },

    #[serde(rename = "GET_FOLLOWERS", rename_all = "camelCase")]
    GetFollowers { username: String },

    #[serde(rename = "GET_FOLLOWING", rename_all = "camelCase")]
    GetFollowing { username: String },

    #[serde(rename = "SEND_MESSAGE", rename_all = "camelCase")]
    SendMessage {
        sender_username: String,
        receiver_username: String,
        content: String,
    },

    #[serde(rename = "MARK_AS_READ", rename_all = "camelCase")]
    MarkAsRead { message_id: String, username: String },

    #[serde(rename = "GET_CONVERSATION", rename_all = "camelCase")]
    GetConversation { username1: String, username2: String },

    #[serde(rename = "GET_UNREAD_MESSAGES", rename_all = "camelCase")]
    GetUnreadMessages { username: String },
}

/// Service-port offset for an action, the balancer's demux rule. Post and
/// feed actions stay on the base port.
pub fn action_port_offset(action: &str) -> u16 {
    match action {
        "USER_REGISTER" | "USER_LOGIN" | "register" => USERS_PORT_OFFSET,
        "FOLLOW_USER" | "UNFOLLOW_USER" | "GET_FOLLOWERS" | "GET_FOLLOWING" => FOLLOW_PORT_OFFSET,
        "SEND_MESSAGE" | "MARK_AS_READ" | "GET_CONVERSATION" | "GET_UNREAD_MESSAGES" => {
            MESSAGES_PORT_OFFSET
        }
        _ => POSTS_PORT_OFFSET,
    }
}

// Reply construction helpers

pub fn ok_reply() -> Value {
    json!({ "success": true })
}

pub fn ok_with(mut fields: Value) -> Value {
    if let Some(map) = fields.as_object_mut() {
        map.insert("success".to_string(), Value::Bool(true));
    }
    fields
}

pub fn error_reply(message: impl Into<String>) -> Value {
    json!({ "success": false, "error": message.into() })
}

pub fn post_json(post: &Post) -> Value {
    json!({
        "postId": post.post_id,
        "username": post.username,
        "content": post.content,
        "createdAt": post.created_at,
        "updatedAt": post.updated_at,
    })
}

pub fn message_json(message: &Message) -> Value {
    json!({
        "messageId": message.message_id,
        "senderUsername": message.sender_username,
        "receiverUsername": message.receiver_username,
        "content": message.content,
        "sentAt": message.sent_at,
        "read": message.read,
        "readAt": message.read_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_alias() {
        let canonical: ClientRequest =
            serde_json::from_str(r#"{"action":"USER_REGISTER","username":"a","password":"p"}"#)
                .unwrap();
        let alias: ClientRequest =
            serde_json::from_str(r#"{"action":"register","username":"a","password":"p"}"#).unwrap();
        assert!(matches!(canonical, ClientRequest::UserRegister { .. }));
        assert!(matches!(alias, ClientRequest::UserRegister { .. }));
    }

    #[test]
    fn test_unknown_action_fails_decoding() {
        let result = serde_json::from_str::<ClientRequest>(r#"{"action":"DROP_TABLES"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_port_offsets() {
        assert_eq!(action_port_offset("USER_REGISTER"), 300);
        assert_eq!(action_port_offset("register"), 300);
        assert_eq!(action_port_offset("USER_LOGIN"), 300);
        assert_eq!(action_port_offset("FOLLOW_USER"), 200);
        assert_eq!(action_port_offset("GET_FOLLOWING"), 200);
        assert_eq!(action_port_offset("SEND_MESSAGE"), 100);
        assert_eq!(action_port_offset("GET_UNREAD_MESSAGES"), 100);
        assert_eq!(action_port_offset("CREATE_POST"), 0);
        assert_eq!(action_port_offset("GET_FEED"), 0);
        assert_eq!(action_port_offset("ANYTHING_ELSE"), 0);
    }

    #[test]
    fn test_reply_helpers() {
        let ok = ok_with(serde_json::json!({ "username": "alice" }));
        assert_eq!(ok["success"], true);
        assert_eq!(ok["username"], "alice");

        let err = error_reply("boom");
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "boom");
    }
}
