// src/main.rs

mod app_state;
mod auth;
mod chat;
mod chat_server;
mod config;
mod db;
mod error;
mod matches;
mod post;
mod rating;
mod users;
mod web_socket_server;

use std::env;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer,
};
use env_logger::Env;
use futures::future::{ok, Ready};

use crate::app_state::AppState;
use crate::auth::{login, profile, signup};
use crate::chat::{
    conversations_by_post, conversations_by_user, conversations_with_details,
    create_conversation, get_conversation, messages_for_conversation, send_message,
    update_conversation,
};
use crate::matches::{create_match, delete_match, get_match, list_matches, update_match};
use crate::post::{create_post, delete_post, get_post, list_posts, update_post};
use crate::rating::{
    create_rating, delete_rating, ratings_for_match, ratings_for_user, update_rating,
};
use crate::users::{get_user, search_users, update_user};
use crate::web_socket_server::ws_index;

#[derive(Debug)]
pub struct Authentication;

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware { service })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        // Extract "Bearer <token>" from the Authorization header if present
        if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if auth_str.starts_with("Bearer ") {
                    let token = auth_str.trim_start_matches("Bearer ").trim().to_string();
                    match verify_token(&token) {
                        Ok(user_id) => {
                            // Insert user_id as a string extension
                            req.extensions_mut().insert(user_id);
                        }
                        Err(e) => {
                            let (req_parts, _payload) = req.into_parts();
                            let resp = HttpResponse::Unauthorized()
                                .body(format!("Invalid token: {}", e))
                                .map_into_boxed_body();
                            let srv_resp = ServiceResponse::new(req_parts, resp);
                            return Box::pin(async move { Ok(srv_resp) });
                        }
                    }
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

fn verify_token(token: &str) -> Result<String, String> {
    let secret = env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
    auth::validate_jwt(token, &secret)
        .map(|claims| claims.sub)
        .map_err(|e| format!("Token decode error: {}", e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env();
    let mongodb = Arc::new(db::MongoDB::init(&config.mongo_uri, &config.database_name).await);
    // Start the ChatServer actor that fans events out to live sockets
    let chat_server = chat_server::ChatServer::new(mongodb.clone()).start();

    let frontend_origin = config.frontend_origin.clone();
    let bind_addr = config.bind_addr.clone();

    println!("Server running at http://{}", bind_addr);
    println!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Authentication)
            .app_data(web::Data::new(AppState {
                chat_server: chat_server.clone(),
                mongodb: mongodb.clone(),
                config: config.clone(),
            }))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(signup))
                    .route("/login", web::post().to(login))
                    .route("/profile", web::get().to(profile))
            )
            // POSTS
            .service(
                web::scope("/posts")
                    .route("", web::post().to(create_post))
                    .route("", web::get().to(list_posts))
                    .route("/{post_id}", web::get().to(get_post))
                    .route("/{post_id}", web::patch().to(update_post))
                    .route("/{post_id}", web::delete().to(delete_post))
            )
            // CONVERSATIONS AND MESSAGES
            .service(
                web::scope("/chat")
                    .service(
                        web::scope("/conversations")
                            // Specific segments first so they never lose to {conversation_id}
                            .route("/post/{post_id}", web::get().to(conversations_by_post))
                            .route("/user/{user_id}/details", web::get().to(conversations_with_details))
                            .route("/user/{user_id}", web::get().to(conversations_by_user))
                            .route("", web::post().to(create_conversation))
                            .route("/{conversation_id}", web::get().to(get_conversation))
                            .route("/{conversation_id}", web::patch().to(update_conversation))
                    )
                    .service(
                        web::scope("/messages")
                            .route("", web::post().to(send_message))
                            .route("/{conversation_id}", web::get().to(messages_for_conversation))
                    )
            )
            // MATCHES
            .service(
                web::scope("/matches")
                    .route("", web::post().to(create_match))
                    .route("", web::get().to(list_matches))
                    .route("/{match_id}", web::get().to(get_match))
                    .route("/{match_id}", web::patch().to(update_match))
                    .route("/{match_id}", web::delete().to(delete_match))
            )
            // RATINGS
            .service(
                web::scope("/ratings")
                    .route("", web::post().to(create_rating))
                    .route("/match/{match_id}", web::get().to(ratings_for_match))
                    .route("/user/{ratee_id}", web::get().to(ratings_for_user))
                    .route("/{rating_id}", web::patch().to(update_rating))
                    .route("/{rating_id}", web::delete().to(delete_rating))
            )
            // USERS
            .service(
                web::scope("/users")
                    .route("/search", web::get().to(search_users))
                    .route("/{user_id}", web::get().to(get_user))
                    .route("/{user_id}", web::patch().to(update_user))
            )
            // WEBSOCKET route for real-time
            .service(
                web::resource("/ws").route(web::get().to(ws_index))
            )
    })
        .bind(&bind_addr)?
        .run()
        .await
}
