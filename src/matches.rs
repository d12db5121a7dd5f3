// src/matches.rs

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
use crate::post::{posts, validate_time_window, GeoPoint, Post};

/// A confirmed game. Created by the confirmation flow, which copies the
/// agreed details out of the post and the conversation participants into
/// `players_id`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Match {
    #[serde(rename = "_id")]
    pub id: String,
    pub post_id: String,
    pub players_id: Vec<String>,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    #[serde(default = "default_status")]
    pub status: String,
    pub confirm_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> String {
    "confirm".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateMatchRequest {
    pub post_id: String,
    pub players_id: Vec<String>,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub status: Option<String>,
    pub confirm_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMatchRequest {
    pub players_id: Option<Vec<String>>,
    pub sport: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
    pub status: Option<String>,
    pub confirm_by: Option<String>,
}

pub fn matches(db: &MongoDB) -> mongodb::Collection<Match> {
    db.collection::<Match>("matches")
}

/// Builds the match record for a confirmed conversation: game details come
/// from the post, the roster from the conversation participants.
pub fn match_from(post: &Post, players: &[String], confirm_by: Option<&str>) -> Match {
    let now = Utc::now();
    Match {
        id: Uuid::new_v4().to_string(),
        post_id: post.id.clone(),
        players_id: players.to_vec(),
        sport: post.sport.clone(),
        start_time: post.start_time,
        end_time: post.end_time,
        location: post.location,
        status: default_status(),
        confirm_by: confirm_by.map(|c| c.to_string()),
        created_at: now,
        updated_at: now,
    }
}

/// Inserts the match for a confirmed conversation and closes its post
/// (`status` -> inactive, `match_id` set). Returns the stored match.
pub async fn create_for_confirmation(
    db: &MongoDB,
    post: &Post,
    players: &[String],
    confirm_by: Option<&str>,
) -> Result<Match, ApiError> {
    let new_match = match_from(post, players, confirm_by);
    matches(db).insert_one(&new_match).await?;

    posts(db)
        .update_one(
            doc! { "_id": &post.id },
            doc! { "$set": {
                "status": "inactive",
                "match_id": &new_match.id,
                "updated_at": to_bson(&Utc::now())?,
            } },
        )
        .await?;
    info!("Match created for post {}: {}", post.id, new_match.id);
    Ok(new_match)
}

/// POST /matches
pub async fn create_match(
    data: web::Data<AppState>,
    payload: web::Json<CreateMatchRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validate_time_window(payload.start_time, payload.end_time)?;

    let now = Utc::now();
    let new_match = Match {
        id: Uuid::new_v4().to_string(),
        post_id: payload.post_id,
        players_id: payload.players_id,
        sport: payload.sport,
        start_time: payload.start_time,
        end_time: payload.end_time,
        location: payload.location,
        status: payload.status.unwrap_or_else(default_status),
        confirm_by: payload.confirm_by,
        created_at: now,
        updated_at: now,
    };
    matches(&data.mongodb).insert_one(&new_match).await?;
    Ok(HttpResponse::Ok().json(new_match))
}

/// GET /matches
pub async fn list_matches(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut cursor = matches(&data.mongodb).find(doc! {}).await?;
    let mut all = Vec::new();
    while let Some(m) = cursor.next().await {
        all.push(m?);
    }
    Ok(HttpResponse::Ok().json(all))
}

/// GET /matches/{match_id}
pub async fn get_match(
    data: web::Data<AppState>,
    match_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let found = matches(&data.mongodb)
        .find_one(doc! { "_id": &*match_id })
        .await?
        .ok_or(ApiError::NotFound("match"))?;
    Ok(HttpResponse::Ok().json(found))
}

/// PATCH /matches/{match_id}
pub async fn update_match(
    data: web::Data<AppState>,
    match_id: web::Path<String>,
    payload: web::Json<UpdateMatchRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut set_doc = doc! {};
    if let Some(players_id) = &payload.players_id {
        set_doc.insert("players_id", players_id);
    }
    if let Some(sport) = &payload.sport {
        set_doc.insert("sport", sport);
    }
    if let Some(start_time) = &payload.start_time {
        set_doc.insert("start_time", to_bson(start_time)?);
    }
    if let Some(end_time) = &payload.end_time {
        set_doc.insert("end_time", to_bson(end_time)?);
    }
    if let Some(location) = &payload.location {
        set_doc.insert("location", to_bson(location)?);
    }
    if let Some(status) = &payload.status {
        set_doc.insert("status", status);
    }
    if let Some(confirm_by) = &payload.confirm_by {
        set_doc.insert("confirm_by", confirm_by);
    }
    if set_doc.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    set_doc.insert("updated_at", to_bson(&Utc::now())?);

    let updated = matches(&data.mongodb)
        .find_one_and_update(doc! { "_id": &*match_id }, doc! { "$set": set_doc })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or(ApiError::NotFound("match"))?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /matches/{match_id}
pub async fn delete_match(
    data: web::Data<AppState>,
    match_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let result = matches(&data.mongodb)
        .delete_one(doc! { "_id": &*match_id })
        .await?;
    if result.deleted_count == 0 {
        return Err(ApiError::NotFound("match"));
    }
    Ok(HttpResponse::Ok().body("Match deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post() -> Post {
        let now = Utc::now();
        Post {
            id: "post-1".to_string(),
            user_id: "owner".to_string(),
            sport: "futsal".to_string(),
            title: "5-a-side tonight".to_string(),
            content: None,
            start_time: Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap(),
            location: Some(GeoPoint { latitude: 10.76, longitude: 106.66 }),
            status: "active".to_string(),
            interested_user_id: vec![],
            image: None,
            match_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_match_from_copies_game_details() {
        let post = sample_post();
        let players = vec!["owner".to_string(), "guest".to_string()];
        let m = match_from(&post, &players, Some("guest"));

        assert_eq!(m.post_id, "post-1");
        assert_eq!(m.players_id, players);
        assert_eq!(m.sport, "futsal");
        assert_eq!(m.start_time, post.start_time);
        assert_eq!(m.end_time, post.end_time);
        assert_eq!(m.location, post.location);
        assert_eq!(m.status, "confirm");
        assert_eq!(m.confirm_by.as_deref(), Some("guest"));
    }

    #[test]
    fn test_match_from_without_confirmer() {
        let post = sample_post();
        let m = match_from(&post, &[], None);
        assert!(m.players_id.is_empty());
        assert!(m.confirm_by.is_none());
    }
}
