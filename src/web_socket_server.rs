use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use log::warn;

use crate::app_state::AppState;
use crate::chat_server::{
    ChatServer, Disconnect, JoinConversation, JoinUser, SendChatMessage, WsEvent,
};
//web_socket_server.rs

/// What clients may ask over the socket. Same envelope as the server
/// side: `{"event": ..., "data": {...}}`.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation { conversation_id: String },
    JoinUser { user_id: String },
    SendMessage { conversation_id: String, sender_id: String, content: String },
}

pub struct WebSocketConnection {
    pub hb: Instant,
    pub addr: Addr<ChatServer>,
}

impl WebSocketConnection {
    pub fn new(addr: Addr<ChatServer>) -> Self {
        WebSocketConnection {
            hb: Instant::now(),
            addr,
        }
    }

    pub fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(Duration::from_secs(5), |act, ctx| {
            if Instant::now().duration_since(act.hb) > Duration::from_secs(10) {
                warn!("WebSocket client heartbeat failed, disconnecting.");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WebSocketConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        // Start the heartbeat process. Rooms are joined on demand via
        // client events.
        self.hb(ctx);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.addr.do_send(Disconnect {
            addr: ctx.address().recipient(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::JoinConversation { conversation_id }) => {
                    self.addr.do_send(JoinConversation {
                        conversation_id,
                        addr: ctx.address().recipient(),
                    });
                }
                Ok(ClientEvent::JoinUser { user_id }) => {
                    self.addr.do_send(JoinUser {
                        user_id,
                        addr: ctx.address().recipient(),
                    });
                }
                Ok(ClientEvent::SendMessage { conversation_id, sender_id, content }) => {
                    self.addr.do_send(SendChatMessage {
                        conversation_id,
                        sender_id,
                        content,
                    });
                }
                Err(e) => {
                    warn!("Failed to parse client event: {}", e);
                }
            },
            Ok(ws::Message::Close(_)) => {
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error: {}", e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<WsEvent> for WebSocketConnection {
    type Result = ();

    fn handle(&mut self, msg: WsEvent, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.text(msg.0);
    }
}

/// GET /ws
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(
        WebSocketConnection::new(data.chat_server.clone()),
        &req,
        stream,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_join_conversation() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"join_conversation","data":{"conversation_id":"conv-1"}}"#,
        )
        .unwrap();
        assert_eq!(event, ClientEvent::JoinConversation { conversation_id: "conv-1".to_string() });
    }

    #[test]
    fn test_client_event_join_user() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"join_user","data":{"user_id":"u1"}}"#).unwrap();
        assert_eq!(event, ClientEvent::JoinUser { user_id: "u1".to_string() });
    }

    #[test]
    fn test_client_event_send_message() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"conversation_id":"conv-1","sender_id":"u1","content":"on my way"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                conversation_id: "conv-1".to_string(),
                sender_id: "u1".to_string(),
                content: "on my way".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(
            r#"{"event":"leave_conversation","data":{}}"#
        )
        .is_err());
    }
}
