use actix::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use log::{error, info};

use crate::chat::{store_message, SendMessageRequest};
use crate::db::MongoDB;

/// One event on the wire: an `{"event": ..., "data": ...}` envelope,
/// already serialized.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct WsEvent(pub String);

pub fn envelope(event: &str, data: &serde_json::Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct JoinUser {
    pub user_id: String,
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct JoinConversation {
    pub conversation_id: String,
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct BroadcastConversation {
    pub conversation_id: String,
    pub event: String,
    pub data: serde_json::Value,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct BroadcastUser {
    pub user_id: String,
    pub event: String,
    pub data: serde_json::Value,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct SendChatMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
}

/// Registry of live sockets. A socket lands in `users` under its own id
/// and in `rooms` under every conversation it joined; both sides can hold
/// several connections per key.
pub struct ChatServer {
    users: HashMap<String, Vec<Recipient<WsEvent>>>,
    rooms: HashMap<String, Vec<Recipient<WsEvent>>>,
    db: Arc<MongoDB>,
}

impl ChatServer {
    pub fn new(db: Arc<MongoDB>) -> Self {
        ChatServer {
            users: HashMap::new(),
            rooms: HashMap::new(),
            db,
        }
    }

    fn send_to(map: &HashMap<String, Vec<Recipient<WsEvent>>>, key: &str, text: &str) {
        if let Some(addrs) = map.get(key) {
            for addr in addrs {
                addr.do_send(WsEvent(text.to_string()));
            }
        }
    }
}

impl Actor for ChatServer {
    type Context = Context<Self>;
}

impl Handler<JoinUser> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: JoinUser, _: &mut Context<Self>) {
        info!("User {} joined their channel (WS)", msg.user_id);
        self.users.entry(msg.user_id).or_default().push(msg.addr);
    }
}

impl Handler<JoinConversation> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: JoinConversation, _: &mut Context<Self>) {
        info!("Socket joined conversation {} (WS)", msg.conversation_id);
        self.rooms
            .entry(msg.conversation_id)
            .or_default()
            .push(msg.addr);
    }
}

impl Handler<Disconnect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        // Drop this connection everywhere it registered.
        self.users.retain(|_, addrs| {
            addrs.retain(|a| a != &msg.addr);
            !addrs.is_empty()
        });
        self.rooms.retain(|_, addrs| {
            addrs.retain(|a| a != &msg.addr);
            !addrs.is_empty()
        });
    }
}

impl Handler<BroadcastConversation> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: BroadcastConversation, _: &mut Context<Self>) {
        let text = envelope(&msg.event, &msg.data);
        Self::send_to(&self.rooms, &msg.conversation_id, &text);
    }
}

impl Handler<BroadcastUser> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: BroadcastUser, _: &mut Context<Self>) {
        let text = envelope(&msg.event, &msg.data);
        Self::send_to(&self.users, &msg.user_id, &text);
    }
}

impl Handler<SendChatMessage> for ChatServer {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, msg: SendChatMessage, _: &mut Context<Self>) -> Self::Result {
        let db = self.db.clone();
        let users_map = self.users.clone();
        let rooms_map = self.rooms.clone();
        Box::pin(async move {
            let stored = store_message(
                &db,
                SendMessageRequest {
                    conversation_id: msg.conversation_id.clone(),
                    sender_id: msg.sender_id.clone(),
                    content: msg.content,
                },
            )
            .await;
            let (message, conversation) = match stored {
                Ok(pair) => pair,
                Err(e) => {
                    error!(
                        "Failed to store socket message for conversation {}: {}",
                        msg.conversation_id, e
                    );
                    return;
                }
            };

            let value = match serde_json::to_value(&message) {
                Ok(value) => value,
                Err(e) => {
                    error!("Failed to serialize message {}: {}", message.id, e);
                    return;
                }
            };
            let text = envelope("new_message", &value);

            // The room hears everything, the sender's own user channel
            // stays quiet.
            ChatServer::send_to(&rooms_map, &msg.conversation_id, &text);
            for participant in &conversation.participants {
                if participant != &msg.sender_id {
                    ChatServer::send_to(&users_map, participant, &text);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let data = json!({ "content": "see you at 7" });
        let text = envelope("new_message", &data);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["event"], "new_message");
        assert_eq!(parsed["data"]["content"], "see you at 7");
    }
}
