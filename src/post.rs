// src/post.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, to_bson};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use log::info;

use crate::app_state::AppState;
use crate::db::MongoDB;
use crate::error::ApiError;

/// A latitude/longitude pair. Kept as-is; anything non-finite is dropped
/// before it reaches the store.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// An offer to play: one owner, a sport, a time window, and the users who
/// have shown interest. Closing happens exactly once, when a conversation
/// on this post confirms (`status` flips to `inactive` and `match_id` is
/// set by the match factory).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Post {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub sport: String,
    pub title: String,
    pub content: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub interested_user_id: Vec<String>,
    pub image: Option<String>,
    pub match_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> String {
    "active".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub user_id: String,
    pub sport: String,
    pub title: String,
    pub content: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub status: Option<String>,
    pub interested_user_id: Option<Vec<String>>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub sport: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
    pub status: Option<String>,
    pub image: Option<String>,
}

pub fn posts(db: &MongoDB) -> mongodb::Collection<Post> {
    db.collection::<Post>("posts")
}

/// Drops a location whose coordinates are not finite numbers.
pub fn sanitize_location(location: Option<GeoPoint>) -> Option<GeoPoint> {
    location.filter(|loc| loc.latitude.is_finite() && loc.longitude.is_finite())
}

/// The play window must be a real interval.
pub fn validate_time_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ApiError> {
    if start >= end {
        return Err(ApiError::Validation(
            "start_time must be before end_time".to_string(),
        ));
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<(), ApiError> {
    if status != "active" && status != "inactive" {
        return Err(ApiError::Validation(
            "status must be 'active' or 'inactive'".to_string(),
        ));
    }
    Ok(())
}

/// POST /posts
pub async fn create_post(
    data: web::Data<AppState>,
    payload: web::Json<CreatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validate_time_window(payload.start_time, payload.end_time)?;
    let status = payload.status.unwrap_or_else(default_status);
    validate_status(&status)?;

    let now = Utc::now();
    let new_post = Post {
        id: Uuid::new_v4().to_string(),
        user_id: payload.user_id,
        sport: payload.sport,
        title: payload.title,
        content: payload.content,
        start_time: payload.start_time,
        end_time: payload.end_time,
        location: sanitize_location(payload.location),
        status,
        interested_user_id: payload.interested_user_id.unwrap_or_default(),
        image: payload.image,
        match_id: None,
        created_at: now,
        updated_at: now,
    };

    posts(&data.mongodb).insert_one(&new_post).await?;
    info!("Post created: {}", new_post.id);
    Ok(HttpResponse::Ok().json(new_post))
}

/// GET /posts
pub async fn list_posts(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut cursor = posts(&data.mongodb).find(doc! {}).await?;
    let mut all = Vec::new();
    while let Some(post) = cursor.next().await {
        all.push(post?);
    }
    Ok(HttpResponse::Ok().json(all))
}

/// GET /posts/{post_id}
pub async fn get_post(
    data: web::Data<AppState>,
    post_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post = posts(&data.mongodb)
        .find_one(doc! { "_id": &*post_id })
        .await?
        .ok_or(ApiError::NotFound("post"))?;
    Ok(HttpResponse::Ok().json(post))
}

/// PATCH /posts/{post_id}
///
/// General field merge. The time window is re-validated against the merged
/// values so a partial update cannot invert it.
pub async fn update_post(
    data: web::Data<AppState>,
    post_id: web::Path<String>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let post_id = post_id.into_inner();
    let current = posts(&data.mongodb)
        .find_one(doc! { "_id": &post_id })
        .await?
        .ok_or(ApiError::NotFound("post"))?;

    let start = payload.start_time.unwrap_or(current.start_time);
    let end = payload.end_time.unwrap_or(current.end_time);
    validate_time_window(start, end)?;

    let mut set_doc = doc! {};
    if let Some(sport) = &payload.sport {
        set_doc.insert("sport", sport);
    }
    if let Some(title) = &payload.title {
        set_doc.insert("title", title);
    }
    if let Some(content) = &payload.content {
        set_doc.insert("content", content);
    }
    if let Some(start_time) = &payload.start_time {
        set_doc.insert("start_time", to_bson(start_time)?);
    }
    if let Some(end_time) = &payload.end_time {
        set_doc.insert("end_time", to_bson(end_time)?);
    }
    if let Some(location) = sanitize_location(payload.location) {
        set_doc.insert("location", to_bson(&location)?);
    }
    if let Some(status) = &payload.status {
        validate_status(status)?;
        set_doc.insert("status", status);
    }
    if let Some(image) = &payload.image {
        set_doc.insert("image", image);
    }
    if set_doc.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    set_doc.insert("updated_at", to_bson(&Utc::now())?);

    let updated = posts(&data.mongodb)
        .find_one_and_update(doc! { "_id": &post_id }, doc! { "$set": set_doc })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or(ApiError::NotFound("post"))?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /posts/{post_id}
///
/// A post stays around for as long as any conversation references it.
pub async fn delete_post(
    data: web::Data<AppState>,
    post_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let post_id = post_id.into_inner();

    let referencing = data
        .mongodb
        .collection::<mongodb::bson::Document>("conversations")
        .find_one(doc! { "post_id": &post_id })
        .await?;
    if referencing.is_some() {
        return Err(ApiError::Conflict(
            "post is referenced by a conversation and cannot be deleted".to_string(),
        ));
    }

    let result = posts(&data.mongodb)
        .delete_one(doc! { "_id": &post_id })
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::NotFound("post"));
    }
    info!("Post deleted: {}", post_id);
    Ok(HttpResponse::Ok().body("Post deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_time_window_must_be_forward() {
        assert!(validate_time_window(at(9), at(11)).is_ok());
        assert!(validate_time_window(at(11), at(9)).is_err());
        assert!(validate_time_window(at(9), at(9)).is_err());
    }

    #[test]
    fn test_sanitize_location_keeps_finite_pairs() {
        let loc = GeoPoint { latitude: 10.76, longitude: 106.66 };
        assert_eq!(sanitize_location(Some(loc)), Some(loc));
        assert_eq!(sanitize_location(None), None);
    }

    #[test]
    fn test_sanitize_location_drops_non_finite_coordinates() {
        let nan = GeoPoint { latitude: f64::NAN, longitude: 106.66 };
        assert_eq!(sanitize_location(Some(nan)), None);
        let inf = GeoPoint { latitude: 10.76, longitude: f64::INFINITY };
        assert_eq!(sanitize_location(Some(inf)), None);
    }

    #[test]
    fn test_status_is_a_two_value_flag() {
        assert!(validate_status("active").is_ok());
        assert!(validate_status("inactive").is_ok());
        assert!(validate_status("archived").is_err());
        assert!(validate_status("Active").is_err());
    }
}
