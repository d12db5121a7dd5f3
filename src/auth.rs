// src/auth.rs

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::doc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use log::info;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::users::{users, User, UserProfile};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// JWT Creation
pub fn create_jwt(user_id: &str, secret: &str) -> Result<String, ApiError> {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

pub fn email_looks_valid(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(email))
        .unwrap_or(false)
}

/// POST /auth/signup
pub async fn signup(
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    // 1. Validate the basics before touching the store.
    if payload.name.trim().len() < 2 {
        return Err(ApiError::Validation(
            "name must be at least 2 characters".to_string(),
        ));
    }
    if !email_looks_valid(&payload.email) {
        return Err(ApiError::Validation("email is not valid".to_string()));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }

    let collection = users(&data.mongodb);

    // 2. One account per email address.
    let existing = collection
        .find_one(doc! { "email": &payload.email })
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("email is already registered".to_string()));
    }

    // 3. Hash and store.
    let hashed_password = hash(&payload.password, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {}", e)))?;
    let now = Utc::now();
    let new_user = User {
        id: Uuid::new_v4().to_string(),
        name: payload.name.clone(),
        email: payload.email.clone(),
        password: hashed_password,
        avatar: None,
        sport: None,
        location: None,
        trust_score: 0.0,
        rating_count: 0,
        created_at: now,
        updated_at: now,
    };
    collection.insert_one(&new_user).await?;
    info!("User signed up: {}", new_user.id);

    let token = create_jwt(&new_user.id, &data.config.jwt_secret)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "token": token,
        "user": UserProfile::from(new_user),
    })))
}

/// POST /auth/login
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = users(&data.mongodb)
        .find_one(doc! { "email": &payload.email })
        .await?;

    match user {
        Some(user) if verify(&payload.password, &user.password).unwrap_or(false) => {
            let token = create_jwt(&user.id, &data.config.jwt_secret)?;
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "token": token,
                "user": UserProfile::from(user),
            })))
        }
        _ => Ok(HttpResponse::Unauthorized().body("Invalid credentials")),
    }
}

/// GET /auth/profile
///
/// The authentication middleware stashes the caller's id in the request
/// extensions.
pub async fn profile(
    data: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = req
        .extensions()
        .get::<String>()
        .cloned()
        .ok_or_else(|| ApiError::Validation("missing authenticated user".to_string()))?;

    let user = users(&data.mongodb)
        .find_one(doc! { "_id": &user_id })
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_round_trip() {
        let token = create_jwt("user-123", "secret").unwrap();
        let claims = validate_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-123");
    }

    #[test]
    fn test_jwt_rejects_wrong_secret() {
        let token = create_jwt("user-123", "secret").unwrap();
        assert!(validate_jwt(&token, "other").is_err());
    }

    #[test]
    fn test_email_shapes() {
        assert!(email_looks_valid("an@example.com"));
        assert!(email_looks_valid("a.b+c@mail.example.org"));
        assert!(!email_looks_valid("not-an-email"));
        assert!(!email_looks_valid("missing@tld"));
        assert!(!email_looks_valid("spaces in@example.com"));
    }
}
