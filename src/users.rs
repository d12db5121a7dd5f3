// src/users.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, to_bson};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::db::MongoDB;
use crate::error::ApiError;
use crate::post::GeoPoint;

/// A registered player. `trust_score` and `rating_count` are derived
/// fields: only the rating recalculation writes them, never a profile
/// update.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<String>,
    pub sport: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub trust_score: f64,
    #[serde(default)]
    pub rating_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What other users are allowed to see. Never carries the password hash.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub sport: Option<String>,
    pub location: Option<GeoPoint>,
    pub trust_score: f64,
    pub rating_count: i64,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            name: user.name,
            email: user.email,
            avatar: user.avatar,
            sport: user.sport,
            location: user.location,
            trust_score: user.trust_score,
            rating_count: user.rating_count,
        }
    }
}

/// Profile fields a user may change. Trust fields are deliberately not
/// here.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub sport: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

pub fn users(db: &MongoDB) -> mongodb::Collection<User> {
    db.collection::<User>("users")
}

pub fn validate_location(location: &GeoPoint) -> Result<(), ApiError> {
    if !(-90.0..=90.0).contains(&location.latitude)
        || !(-180.0..=180.0).contains(&location.longitude)
    {
        return Err(ApiError::Validation(
            "location is out of range".to_string(),
        ));
    }
    Ok(())
}

/// GET /users/{user_id}
pub async fn get_user(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = users(&data.mongodb)
        .find_one(doc! { "_id": &*user_id })
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// PATCH /users/{user_id}
pub async fn update_user(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
    payload: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut set_doc = doc! {};
    if let Some(name) = &payload.name {
        if name.trim().len() < 2 {
            return Err(ApiError::Validation(
                "name must be at least 2 characters".to_string(),
            ));
        }
        set_doc.insert("name", name);
    }
    if let Some(email) = &payload.email {
        if !crate::auth::email_looks_valid(email) {
            return Err(ApiError::Validation("email is not valid".to_string()));
        }
        set_doc.insert("email", email);
    }
    if let Some(avatar) = &payload.avatar {
        set_doc.insert("avatar", avatar);
    }
    if let Some(sport) = &payload.sport {
        set_doc.insert("sport", sport);
    }
    if let Some(location) = &payload.location {
        validate_location(location)?;
        set_doc.insert("location", to_bson(location)?);
    }
    if set_doc.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    set_doc.insert("updated_at", to_bson(&Utc::now())?);

    let updated = users(&data.mongodb)
        .find_one_and_update(doc! { "_id": &*user_id }, doc! { "$set": set_doc })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(updated)))
}

/// GET /users/search?query=...
pub async fn search_users(
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    // 1. Case-insensitive substring match on the email address.
    let filter = doc! { "email": { "$regex": &query.query, "$options": "i" } };
    let mut cursor = users(&data.mongodb).find(filter).await?;

    // 2. Project down to the public shape.
    let mut profiles = Vec::new();
    while let Some(user) = cursor.next().await {
        profiles.push(UserProfile::from(user?));
    }
    Ok(HttpResponse::Ok().json(profiles))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: "u1".to_string(),
            name: "An Nguyen".to_string(),
            email: "an@example.com".to_string(),
            password: "$2b$12$hash".to_string(),
            avatar: None,
            sport: Some("badminton".to_string()),
            location: None,
            trust_score: 72.0,
            rating_count: 9,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_carries_trust_fields() {
        let profile = UserProfile::from(sample_user());
        assert_eq!(profile.trust_score, 72.0);
        assert_eq!(profile.rating_count, 9);
    }

    #[test]
    fn test_profile_never_serializes_password() {
        let json = serde_json::to_string(&UserProfile::from(sample_user())).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("$2b$"));
    }

    #[test]
    fn test_location_range() {
        assert!(validate_location(&GeoPoint { latitude: 10.76, longitude: 106.66 }).is_ok());
        assert!(validate_location(&GeoPoint { latitude: 90.0, longitude: -180.0 }).is_ok());
        assert!(validate_location(&GeoPoint { latitude: 91.0, longitude: 0.0 }).is_err());
        assert!(validate_location(&GeoPoint { latitude: 0.0, longitude: 200.0 }).is_err());
    }
}
