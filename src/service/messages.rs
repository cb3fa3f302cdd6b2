// Direct message service
//
// Only the receiver may mark a message read. A second MARK_AS_READ is an
// error but leaves the message read with its original read timestamp.

use crate::node::CoordinationContext;
use crate::replication::event::ReplicationEvent;
use crate::repository::Message;
use crate::service::dispatcher::ActionHandler;
use crate::service::request::{error_reply, message_json, ok_with, ClientRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const ACTIONS: &[&str] = &[
    "SEND_MESSAGE",
    "MARK_AS_READ",
    "GET_CONVERSATION",
    "GET_UNREAD_MESSAGES",
];

pub struct MessageHandler {
    ctx: Arc<CoordinationContext>,
}

impl MessageHandler {
    pub fn new(ctx: Arc<CoordinationContext>) -> Self {
        Self { ctx }
    }

    fn send(&self, sender_username: String, receiver_username: String, content: String) -> Value {
        if content.trim().is_empty() {
            return error_reply("content must not be empty");
        }
        let Some(sender) = self.ctx.users.get(&sender_username) else {
            return error_reply(format!("user '{}' not found", sender_username));
        };
        let Some(receiver) = self.ctx.users.get(&receiver_username) else {
            return error_reply(format!("user '{}' not found", receiver_username));
        };

        let message = Message::new(
            sender.username,
            receiver.username,
            content,
            self.ctx.physical.now_millis(),
        );
        match self.ctx.messages.add(message.clone()) {
            Ok(()) => {
                self.ctx
                    .queue
                    .enqueue(ReplicationEvent::message_sent(&message, message.sent_at));
                ok_with(json!({
                    "messageId": message.message_id,
                    "sentAt": message.sent_at,
                }))
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn mark_as_read(&self, message_id: String, username: String) -> Value {
        let Ok(message_id) = Uuid::parse_str(&message_id) else {
            return error_reply(format!("invalid message id '{}'", message_id));
        };
        let Some(mut message) = self.ctx.messages.get_by_id(message_id) else {
            return error_reply(format!("message {} not found", message_id));
        };
        if !message.receiver_username.eq_ignore_ascii_case(&username) {
            return error_reply("only the receiver may mark a message as read");
        }
        if message.read {
            return error_reply("message already read");
        }

        message.read = true;
        message.read_at = Some(self.ctx.physical.now_millis());
        match self.ctx.messages.update(message.clone()) {
            Ok(()) => ok_with(json!({
                "messageId": message.message_id,
                "readAt": message.read_at,
            })),
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn conversation(&self, username1: String, username2: String) -> Value {
        let Some(first) = self.ctx.users.get(&username1) else {
            return error_reply(format!("user '{}' not found", username1));
        };
        let Some(second) = self.ctx.users.get(&username2) else {
            return error_reply(format!("user '{}' not found", username2));
        };
        let messages: Vec<Value> = self
            .ctx
            .messages
            .get_conversation(&first.username, &second.username)
            .iter()
            .map(message_json)
            .collect();
        ok_with(json!({ "count": messages.len(), "messages": messages }))
    }

    fn unread(&self, username: String) -> Value {
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };
        let messages: Vec<Value> = self
            .ctx
            .messages
            .get_unread_by_receiver(&user.username)
            .iter()
            .map(message_json)
            .collect();
        ok_with(json!({ "count": messages.len(), "messages": messages }))
    }
}

#[async_trait]
impl ActionHandler for MessageHandler {
    fn name(&self) -> &'static str {
        "messages"
    }

    fn handles(&self, action: &str) -> bool {
        ACTIONS.contains(&action)
    }

    async fn dispatch(&self, request: ClientRequest) -> Value {
        match request {
            ClientRequest::SendMessage {
                sender_username,
                receiver_username,
                content,
            } => self.send(sender_username, receiver_username, content),
            ClientRequest::MarkAsRead {
                message_id,
                username,
            } => self.mark_as_read(message_id, username),
            ClientRequest::GetConversation {
                username1,
                username2,
            } => self.conversation(username1, username2),
            ClientRequest::GetUnreadMessages { username } => self.unread(username),
            _ => error_reply("action not served on this port"),
        }
    }
}
