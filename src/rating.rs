// src/rating.rs

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
use crate::matches::{matches, Match};
use crate::users::users;

/// One player's verdict on another for a single match. The triple
/// (match_id, rater_id, ratee_id) is unique.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Rating {
    #[serde(rename = "_id")]
    pub id: String,
    pub match_id: String,
    pub rater_id: String,
    pub ratee_id: String,
    pub score: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRatingRequest {
    pub match_id: String,
    pub rater_id: String,
    pub ratee_id: String,
    pub score: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRatingRequest {
    pub score: Option<i32>,
    pub comment: Option<String>,
}

pub fn ratings(db: &MongoDB) -> mongodb::Collection<Rating> {
    db.collection::<Rating>("ratings")
}

fn validate_score(score: i32) -> Result<(), ApiError> {
    if !(1..=5).contains(&score) {
        return Err(ApiError::Validation(
            "score must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}

/// The match-side gate for a new rating: only against a confirmed match,
/// only between players on its roster (when it has one), and only once
/// per (match, rater, ratee) triple.
pub fn rating_allowed(
    game: &Match,
    payload: &CreateRatingRequest,
    already_rated: bool,
) -> Result<(), ApiError> {
    if game.status != "confirm" {
        return Err(ApiError::Conflict(
            "match is not confirmed, rating not allowed".to_string(),
        ));
    }
    if !game.players_id.is_empty()
        && (!game.players_id.contains(&payload.rater_id)
            || !game.players_id.contains(&payload.ratee_id))
    {
        return Err(ApiError::Conflict(
            "only matched players can rate each other".to_string(),
        ));
    }
    if already_rated {
        return Err(ApiError::Conflict(
            "this player has already been rated for this match".to_string(),
        ));
    }
    Ok(())
}

/// Reduces a set of 1-5 scores to the stored pair: trust score on a 0-100
/// scale and the number of ratings behind it. No ratings means (0, 0).
pub fn trust_summary(scores: &[i32]) -> (f64, i64) {
    if scores.is_empty() {
        return (0.0, 0);
    }
    let total: i64 = scores.iter().map(|s| *s as i64).sum();
    let avg = total as f64 / scores.len() as f64;
    let trust_score = (avg / 5.0 * 100.0).clamp(0.0, 100.0);
    (trust_score, scores.len() as i64)
}

/// Recomputes the ratee's trust fields from every rating on record. This
/// is the only place `trust_score` and `rating_count` are written, and it
/// runs after each rating mutation so the fields never go stale.
pub async fn recalculate_trust_score(db: &MongoDB, ratee_id: &str) -> Result<(), ApiError> {
    let mut cursor = ratings(db).find(doc! { "ratee_id": ratee_id }).await?;
    let mut scores = Vec::new();
    while let Some(rating) = cursor.next().await {
        scores.push(rating?.score);
    }

    let (trust_score, rating_count) = trust_summary(&scores);
    users(db)
        .update_one(
            doc! { "_id": ratee_id },
            doc! { "$set": {
                "trust_score": trust_score,
                "rating_count": rating_count,
                "updated_at": to_bson(&Utc::now())?,
            } },
        )
        .await?;
    info!(
        "Trust score for {} recalculated: {} from {} ratings",
        ratee_id, trust_score, rating_count
    );
    Ok(())
}

/// POST /ratings
pub async fn create_rating(
    data: web::Data<AppState>,
    payload: web::Json<CreateRatingRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validate_score(payload.score)?;
    if payload.rater_id == payload.ratee_id {
        return Err(ApiError::Validation(
            "you cannot rate yourself".to_string(),
        ));
    }

    // 1. Snapshot what the gate needs: the match and any prior rating
    //    for this triple.
    let game = matches(&data.mongodb)
        .find_one(doc! { "_id": &payload.match_id })
        .await?
        .ok_or_else(|| ApiError::Validation("unknown match".to_string()))?;
    let already_rated = ratings(&data.mongodb)
        .find_one(doc! {
            "match_id": &payload.match_id,
            "rater_id": &payload.rater_id,
            "ratee_id": &payload.ratee_id,
        })
        .await?
        .is_some();

    // 2. Confirmed match, roster membership, fresh triple.
    rating_allowed(&game, &payload, already_rated)?;

    let now = Utc::now();
    let new_rating = Rating {
        id: Uuid::new_v4().to_string(),
        match_id: payload.match_id,
        rater_id: payload.rater_id,
        ratee_id: payload.ratee_id.clone(),
        score: payload.score,
        comment: payload.comment,
        created_at: now,
        updated_at: now,
    };
    ratings(&data.mongodb).insert_one(&new_rating).await?;

    // 3. Fold the new rating into the ratee's trust fields.
    recalculate_trust_score(&data.mongodb, &payload.ratee_id).await?;

    Ok(HttpResponse::Ok().json(new_rating))
}

/// GET /ratings/match/{match_id}
pub async fn ratings_for_match(
    data: web::Data<AppState>,
    match_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = ratings(&data.mongodb)
        .find(doc! { "match_id": &*match_id })
        .await?;
    let mut all = Vec::new();
    while let Some(rating) = cursor.next().await {
        all.push(rating?);
    }
    Ok(HttpResponse::Ok().json(all))
}

/// GET /ratings/user/{ratee_id}
pub async fn ratings_for_user(
    data: web::Data<AppState>,
    ratee_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = ratings(&data.mongodb)
        .find(doc! { "ratee_id": &*ratee_id })
        .await?;
    let mut all = Vec::new();
    while let Some(rating) = cursor.next().await {
        all.push(rating?);
    }
    Ok(HttpResponse::Ok().json(all))
}

/// PATCH /ratings/{rating_id}
///
/// Only the verdict itself can change; the triple is immutable. The
/// ratee's trust fields are recomputed afterwards.
pub async fn update_rating(
    data: web::Data<AppState>,
    rating_id: web::Path<String>,
    payload: web::Json<UpdateRatingRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut set_doc = doc! {};
    if let Some(score) = payload.score {
        validate_score(score)?;
        set_doc.insert("score", score);
    }
    if let Some(comment) = &payload.comment {
        set_doc.insert("comment", comment);
    }
    if set_doc.is_empty() {
        return Err(ApiError::Validation("no fields to update".to_string()));
    }
    set_doc.insert("updated_at", to_bson(&Utc::now())?);

    let updated = ratings(&data.mongodb)
        .find_one_and_update(doc! { "_id": &*rating_id }, doc! { "$set": set_doc })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or(ApiError::NotFound("rating"))?;

    recalculate_trust_score(&data.mongodb, &updated.ratee_id).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /ratings/{rating_id}
pub async fn delete_rating(
    data: web::Data<AppState>,
    rating_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let deleted = ratings(&data.mongodb)
        .find_one_and_delete(doc! { "_id": &*rating_id })
        .await?
        .ok_or(ApiError::NotFound("rating"))?;

    recalculate_trust_score(&data.mongodb, &deleted.ratee_id).await?;
    Ok(HttpResponse::Ok().body("Rating deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_summary_empty_resets_to_zero() {
        assert_eq!(trust_summary(&[]), (0.0, 0));
    }

    #[test]
    fn test_trust_summary_average_maps_to_percent() {
        // avg 4.0 of 5 -> 80
        let (score, count) = trust_summary(&[5, 4, 3]);
        assert_eq!(score, 80.0);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_trust_summary_second_rating_moves_the_score() {
        // A 3 on record, a 5 arrives: ((5+3)/2)/5*100 = 80.
        assert_eq!(trust_summary(&[3, 5]), (80.0, 2));
    }

    #[test]
    fn test_trust_summary_single_rating() {
        assert_eq!(trust_summary(&[1]), (20.0, 1));
        assert_eq!(trust_summary(&[5]), (100.0, 1));
    }

    #[test]
    fn test_trust_summary_is_order_independent() {
        assert_eq!(trust_summary(&[3, 4, 5]), trust_summary(&[5, 3, 4]));
    }

    #[test]
    fn test_score_bounds() {
        assert!(validate_score(1).is_ok());
        assert!(validate_score(5).is_ok());
        assert!(validate_score(0).is_err());
        assert!(validate_score(6).is_err());
    }

    fn game_with(status: &str, players: &[&str]) -> Match {
        let now = Utc::now();
        Match {
            id: "match-1".to_string(),
            post_id: "post-1".to_string(),
            players_id: players.iter().map(|p| p.to_string()).collect(),
            sport: "tennis".to_string(),
            start_time: now,
            end_time: now,
            location: None,
            status: status.to_string(),
            confirm_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(rater: &str, ratee: &str) -> CreateRatingRequest {
        CreateRatingRequest {
            match_id: "match-1".to_string(),
            rater_id: rater.to_string(),
            ratee_id: ratee.to_string(),
            score: 4,
            comment: None,
        }
    }

    #[test]
    fn test_rating_allowed_for_matched_players() {
        let game = game_with("confirm", &["owner", "guest"]);
        assert!(rating_allowed(&game, &request("owner", "guest"), false).is_ok());
    }

    #[test]
    fn test_rating_rejected_on_unconfirmed_match() {
        let game = game_with("cancelled", &["owner", "guest"]);
        let err = rating_allowed(&game, &request("owner", "guest"), false).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_rating_rejected_off_the_roster() {
        let game = game_with("confirm", &["owner", "guest"]);
        let err = rating_allowed(&game, &request("stranger", "guest"), false).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        let err = rating_allowed(&game, &request("owner", "stranger"), false).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_rating_allowed_when_roster_is_empty() {
        let game = game_with("confirm", &[]);
        assert!(rating_allowed(&game, &request("anyone", "else"), false).is_ok());
    }

    #[test]
    fn test_duplicate_rating_rejected() {
        let game = game_with("confirm", &["owner", "guest"]);
        let err = rating_allowed(&game, &request("owner", "guest"), true).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_unconfirmed_match_outranks_duplicate() {
        // Both violations at once: the status conflict is reported first.
        let game = game_with("pending", &["owner", "guest"]);
        let err = rating_allowed(&game, &request("owner", "guest"), true).unwrap_err();
        if let ApiError::Conflict(message) = err {
            assert!(message.contains("not confirmed"));
        } else {
            panic!("expected a conflict");
        }
    }
}
