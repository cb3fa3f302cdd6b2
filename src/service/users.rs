// User service: registration and login

use crate::node::CoordinationContext;
use crate::replication::event::ReplicationEvent;
use crate::repository::User;
use crate::service::dispatcher::ActionHandler;
use crate::service::request::{error_reply, ok_with, ClientRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const ACTIONS: &[&str] = &["USER_REGISTER", "register", "USER_LOGIN"];

pub struct UserHandler {
    ctx: Arc<CoordinationContext>,
}

impl UserHandler {
    pub fn new(ctx: Arc<CoordinationContext>) -> Self {
        Self { ctx }
    }

    fn register(&self, username: String, password: String) -> Value {
        let username = username.trim().to_string();
        if username.is_empty() {
            return error_reply("username must not be empty");
        }
        if password.is_empty() {
            return error_reply("password must not be empty");
        }

        let user = User::new(username, password, self.ctx.physical.now_millis());
        match self.ctx.users.add(user.clone()) {
            Ok(()) => {
                self.ctx
                    .queue
                    .enqueue(ReplicationEvent::user_created(&user, user.created_at));
                tracing::info!("registered user '{}'", user.username);
                ok_with(json!({ "username": user.username }))
            }
            Err(e) => error_reply(e.to_string()),
        }
    }

    fn login(&self, username: String, password: String) -> Value {
        let Some(user) = self.ctx.users.get(&username) else {
            return error_reply(format!("user '{}' not found", username));
        };
        if user.password != password {
            return error_reply("invalid password");
        }
        ok_with(json!({ "username": user.username }))
    }
}

#[async_trait]
impl ActionHandler for UserHandler {
    fn name(&self) -> &'static str {
        "users"
    }

    fn handles(&self, action: &str) -> bool {
        ACTIONS.contains(&action)
    }

    async fn dispatch(&self, request: ClientRequest) -> Value {
        match request {
            ClientRequest::UserRegister { username, password } => self.register(username, password),
            ClientRequest::UserLogin { username, password } => self.login(username, password),
            _ => error_reply("action not served on this port"),
        }
    }
}
