// File: chat.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use log::{error, info};

use crate::app_state::AppState;
use crate::chat_server::{BroadcastConversation, BroadcastUser};
use crate::db::MongoDB;
use crate::error::ApiError;
use crate::matches::create_for_confirmation;
use crate::post::{posts, Post};
use crate::users::{users, UserProfile};

/// Where a conversation stands on the way to a match. Forward progress is
/// `no` -> `waiting` -> `confirm`; the reconciler can push a conversation
/// back to `no` when another one on the same post wins.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchState {
    #[default]
    No,
    Waiting,
    Confirm,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::No => "no",
            MatchState::Waiting => "waiting",
            MatchState::Confirm => "confirm",
        }
    }
}

/// A thread between a post owner and an interested player. `waiting_by`
/// records who proposed the match while it awaits the other side.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    pub post_id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub is_match: MatchState,
    pub confirm_by: Option<String>,
    pub waiting_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub post_id: String,
    pub participants: Option<Vec<String>>,
    pub is_match: Option<MatchState>,
    pub confirm_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub is_match: Option<MatchState>,
    pub waiting_by: Option<String>,
    pub confirm_by: Option<String>,
    pub participants: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
}

/// Conversation as the inbox wants it: the thread itself plus the last
/// message, the person on the other side, and enough of the post to label
/// the row.
#[derive(Debug, Serialize)]
pub struct ConversationDetails {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub last_message: Option<ChatMessage>,
    pub other_participant: Option<UserProfile>,
    pub post_title: String,
    pub post_sport: String,
}

pub fn conversations(db: &MongoDB) -> mongodb::Collection<Conversation> {
    db.collection::<Conversation>("conversations")
}

pub fn chat_messages(db: &MongoDB) -> mongodb::Collection<ChatMessage> {
    db.collection::<ChatMessage>("messages")
}

/// What a PATCH on a conversation should do, decided against a snapshot of
/// the current document.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdatePlan {
    /// Move `no` -> `waiting`, recording the proposer.
    Propose { waiting_by: String },
    /// Move to `confirm`, crediting `confirm_by` with the proposal.
    Confirm { confirm_by: String },
    /// Plain field merge, no transition semantics.
    General,
}

/// Decides the transition for an update request.
///
/// A proposal is only valid from `no` and only by a participant. A confirm
/// while `waiting` credits the recorded proposer, ignoring any
/// caller-supplied `confirm_by`; outside `waiting` a caller-supplied
/// `confirm_by` is taken at face value. Anything else is a general merge.
pub fn plan_update(
    current: &Conversation,
    payload: &UpdateConversationRequest,
) -> Result<UpdatePlan, ApiError> {
    if payload.is_match == Some(MatchState::Waiting) {
        if let Some(waiting_by) = &payload.waiting_by {
            if current.is_match != MatchState::No {
                return Err(ApiError::Conflict(
                    "conversation already has a pending or confirmed proposal".to_string(),
                ));
            }
            if !current.participants.contains(waiting_by) {
                return Err(ApiError::Conflict(
                    "proposer is not a participant of this conversation".to_string(),
                ));
            }
            return Ok(UpdatePlan::Propose {
                waiting_by: waiting_by.clone(),
            });
        }
    }

    if payload.is_match == Some(MatchState::Confirm) {
        if current.is_match == MatchState::Waiting {
            if let Some(proposer) = &current.waiting_by {
                return Ok(UpdatePlan::Confirm {
                    confirm_by: proposer.clone(),
                });
            }
        }
        if let Some(confirmer) = &payload.confirm_by {
            return Ok(UpdatePlan::Confirm {
                confirm_by: confirmer.clone(),
            });
        }
    }

    Ok(UpdatePlan::General)
}

/// A post can only back one match: once it is inactive or carries a
/// match_id, later confirmations lose.
pub fn post_accepts_confirmation(post: &Post) -> bool {
    !(post.status.to_lowercase() == "inactive" || post.match_id.is_some())
}

/// Filter and update for pushing every other conversation of a post back
/// to `no` after one of them confirmed.
pub fn sibling_reset(post_id: &str, keep_id: &str) -> Result<(Document, Document), ApiError> {
    let filter = doc! { "post_id": post_id, "_id": { "$ne": keep_id } };
    let update = doc! {
        "$set": { "is_match": "no", "updated_at": to_bson(&Utc::now())? },
        "$unset": { "waiting_by": "", "confirm_by": "" },
    };
    Ok((filter, update))
}

/// The stored participant list: the requested users plus the post owner,
/// first occurrence wins.
pub fn merged_participants(requested: &[String], owner: &str) -> Vec<String> {
    let mut all = requested.to_vec();
    all.push(owner.to_string());
    let mut seen = std::collections::HashSet::new();
    all.retain(|p| seen.insert(p.clone()));
    all
}

/// Everything that happens after a conversation reaches `confirm`: mint
/// the match, close the post, and reset the sibling conversations. With
/// the post already gone, the post id is still marked inactive and the
/// siblings still reset. Each step is best-effort and independent; the
/// confirmation itself already stands.
pub async fn finalize_confirmation(
    db: &MongoDB,
    conversation: &Conversation,
    post: Option<&Post>,
    confirm_by: &str,
) {
    match post {
        Some(post) => {
            if let Err(e) =
                create_for_confirmation(db, post, &conversation.participants, Some(confirm_by))
                    .await
            {
                error!(
                    "Failed to create match for conversation {}: {}",
                    conversation.id, e
                );
            }
        }
        None => {
            let close = async {
                posts(db)
                    .update_one(
                        doc! { "_id": &conversation.post_id },
                        doc! { "$set": { "status": "inactive", "updated_at": to_bson(&Utc::now())? } },
                    )
                    .await?;
                Ok::<(), ApiError>(())
            };
            if let Err(e) = close.await {
                error!("Failed to close post {}: {}", conversation.post_id, e);
            }
        }
    }

    let sweep = async {
        let (filter, update) = sibling_reset(&conversation.post_id, &conversation.id)?;
        conversations(db).update_many(filter, update).await?;
        Ok::<(), ApiError>(())
    };
    if let Err(e) = sweep.await {
        error!(
            "Failed to reset sibling conversations for post {}: {}",
            conversation.post_id, e
        );
    }
}

/// Pushes a conversation event to its room and to every participant's
/// user channel.
pub fn broadcast_conversation(data: &web::Data<AppState>, conversation: &Conversation, event: &str) {
    let value = match serde_json::to_value(conversation) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to serialize conversation {}: {}", conversation.id, e);
            return;
        }
    };
    data.chat_server.do_send(BroadcastConversation {
        conversation_id: conversation.id.clone(),
        event: event.to_string(),
        data: value.clone(),
    });
    for participant in &conversation.participants {
        data.chat_server.do_send(BroadcastUser {
            user_id: participant.clone(),
            event: event.to_string(),
            data: value.clone(),
        });
    }
}

/// Re-broadcasts every conversation of a post so clients also see the
/// sibling resets, not just the thread they acted on.
async fn broadcast_post_conversations(data: &web::Data<AppState>, post_id: &str) {
    let mut cursor = match conversations(&data.mongodb).find(doc! { "post_id": post_id }).await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Failed to load conversations for post {}: {}", post_id, e);
            return;
        }
    };
    while let Some(result) = cursor.next().await {
        match result {
            Ok(conversation) => broadcast_conversation(data, &conversation, "conversation_updated"),
            Err(e) => error!("Failed to read conversation for post {}: {}", post_id, e),
        }
    }
}

fn broadcast_new_message(
    data: &web::Data<AppState>,
    conversation: &Conversation,
    message: &ChatMessage,
) {
    let value = match serde_json::to_value(message) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to serialize message {}: {}", message.id, e);
            return;
        }
    };
    data.chat_server.do_send(BroadcastConversation {
        conversation_id: conversation.id.clone(),
        event: "new_message".to_string(),
        data: value.clone(),
    });
    for participant in &conversation.participants {
        if participant == &message.sender_id {
            continue;
        }
        data.chat_server.do_send(BroadcastUser {
            user_id: participant.clone(),
            event: "new_message".to_string(),
            data: value.clone(),
        });
    }
}

/// POST /chat/conversations
pub async fn create_conversation(
    data: web::Data<AppState>,
    payload: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();

    // 1. The post anchors the conversation.
    let post = posts(&data.mongodb)
        .find_one(doc! { "_id": &payload.post_id })
        .await?
        .ok_or_else(|| ApiError::Validation("unknown post".to_string()))?;

    // 2. The post owner has no one to talk to in their own thread.
    let requested = payload.participants.unwrap_or_default();
    if let Some(first) = requested.first() {
        if post.user_id == *first {
            return Err(ApiError::Conflict(
                "you cannot start a conversation on your own post".to_string(),
            ));
        }
    }

    // 3. The owner is always in the room.
    let participants = merged_participants(&requested, &post.user_id);

    let now = Utc::now();
    let conversation = Conversation {
        id: Uuid::new_v4().to_string(),
        post_id: payload.post_id.clone(),
        participants,
        is_match: payload.is_match.unwrap_or_default(),
        confirm_by: payload.confirm_by,
        waiting_by: None,
        created_at: now,
        updated_at: now,
    };
    conversations(&data.mongodb).insert_one(&conversation).await?;
    info!("Conversation created on post {}: {}", payload.post_id, conversation.id);

    // 4. Starting a thread counts as interest in the post.
    if let Some(first) = requested.first() {
        posts(&data.mongodb)
            .update_one(
                doc! { "_id": &payload.post_id },
                doc! { "$addToSet": { "interested_user_id": first } },
            )
            .await?;
    }

    Ok(HttpResponse::Ok().json(conversation))
}

/// PATCH /chat/conversations/{conversation_id}
///
/// The matchmaking handshake lives here. Transitions are applied with a
/// filter on the state they were planned against, so two racing updates
/// cannot both win; the loser gets a conflict and can re-read.
pub async fn update_conversation(
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
    payload: web::Json<UpdateConversationRequest>,
) -> Result<HttpResponse, ApiError> {
    let conversation_id = conversation_id.into_inner();
    let payload = payload.into_inner();

    // 1. Snapshot the current state and decide what this request means.
    let current = conversations(&data.mongodb)
        .find_one(doc! { "_id": &conversation_id })
        .await?
        .ok_or(ApiError::NotFound("conversation"))?;
    let plan = plan_update(&current, &payload)?;

    let updated = match plan {
        UpdatePlan::Propose { waiting_by } => {
            let updated = conversations(&data.mongodb)
                .find_one_and_update(
                    doc! { "_id": &conversation_id, "is_match": "no" },
                    doc! {
                        "$set": {
                            "is_match": "waiting",
                            "waiting_by": &waiting_by,
                            "updated_at": to_bson(&Utc::now())?,
                        },
                        // A proposal and a confirmation never coexist.
                        "$unset": { "confirm_by": "" },
                    },
                )
                .return_document(mongodb::options::ReturnDocument::After)
                .await?
                .ok_or_else(|| {
                    ApiError::Conflict("conversation state changed, try again".to_string())
                })?;
            info!(
                "Conversation {} proposed by {}",
                conversation_id, waiting_by
            );
            updated
        }
        UpdatePlan::Confirm { confirm_by } => {
            // 2. A closed post ends the handshake: this thread goes back
            //    to square one instead of minting a second match.
            let post = posts(&data.mongodb)
                .find_one(doc! { "_id": &current.post_id })
                .await?;
            if let Some(post) = &post {
                if !post_accepts_confirmation(post) {
                    let reverted = conversations(&data.mongodb)
                        .find_one_and_update(
                            doc! { "_id": &conversation_id },
                            doc! {
                                "$set": { "is_match": "no", "updated_at": to_bson(&Utc::now())? },
                                "$unset": { "waiting_by": "" },
                            },
                        )
                        .return_document(mongodb::options::ReturnDocument::After)
                        .await?
                        .ok_or(ApiError::NotFound("conversation"))?;
                    info!(
                        "Conversation {} reverted, post {} already matched",
                        conversation_id, current.post_id
                    );
                    broadcast_conversation(&data, &reverted, "conversation_updated");
                    broadcast_post_conversations(&data, &reverted.post_id).await;
                    return Ok(HttpResponse::Ok().json(reverted));
                }
            }

            let updated = conversations(&data.mongodb)
                .find_one_and_update(
                    doc! { "_id": &conversation_id, "is_match": current.is_match.as_str() },
                    doc! {
                        "$set": {
                            "is_match": "confirm",
                            "confirm_by": &confirm_by,
                            "updated_at": to_bson(&Utc::now())?,
                        },
                        "$unset": { "waiting_by": "" },
                    },
                )
                .return_document(mongodb::options::ReturnDocument::After)
                .await?
                .ok_or_else(|| {
                    ApiError::Conflict("conversation state changed, try again".to_string())
                })?;
            info!(
                "Conversation {} confirmed, credited to {}",
                conversation_id, confirm_by
            );

            // 3. Match creation, post closing and sibling resets are
            //    follow-ups: the confirmation stands even if they fail.
            finalize_confirmation(&data.mongodb, &updated, post.as_ref(), &confirm_by).await;
            updated
        }
        UpdatePlan::General => {
            let mut set_doc = doc! {};
            if let Some(is_match) = &payload.is_match {
                set_doc.insert("is_match", is_match.as_str());
            }
            if let Some(waiting_by) = &payload.waiting_by {
                set_doc.insert("waiting_by", waiting_by);
            }
            if let Some(confirm_by) = &payload.confirm_by {
                set_doc.insert("confirm_by", confirm_by);
            }
            if let Some(participants) = &payload.participants {
                set_doc.insert("participants", participants);
            }
            if set_doc.is_empty() {
                return Ok(HttpResponse::Ok().json(current));
            }
            set_doc.insert("updated_at", to_bson(&Utc::now())?);

            conversations(&data.mongodb)
                .find_one_and_update(doc! { "_id": &conversation_id }, doc! { "$set": set_doc })
                .return_document(mongodb::options::ReturnDocument::After)
                .await?
                .ok_or(ApiError::NotFound("conversation"))?
        }
    };

    // 4. Everyone watching this post hears about the new state.
    broadcast_conversation(&data, &updated, "conversation_updated");
    broadcast_post_conversations(&data, &updated.post_id).await;

    Ok(HttpResponse::Ok().json(updated))
}

/// GET /chat/conversations/post/{post_id}
pub async fn conversations_by_post(
    data: web::Data<AppState>,
    post_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = conversations(&data.mongodb)
        .find(doc! { "post_id": &*post_id })
        .await?;
    let mut all = Vec::new();
    while let Some(conversation) = cursor.next().await {
        all.push(conversation?);
    }
    Ok(HttpResponse::Ok().json(all))
}

/// GET /chat/conversations/user/{user_id}
pub async fn conversations_by_user(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = conversations(&data.mongodb)
        .find(doc! { "participants": &*user_id })
        .sort(doc! { "updated_at": -1 })
        .await?;
    let mut all = Vec::new();
    while let Some(conversation) = cursor.next().await {
        all.push(conversation?);
    }
    Ok(HttpResponse::Ok().json(all))
}

/// GET /chat/conversations/user/{user_id}/details
///
/// The inbox view: newest activity first, each row decorated with its
/// last message, counterpart and post labels.
pub async fn conversations_with_details(
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let mut cursor = conversations(&data.mongodb)
        .find(doc! { "participants": &user_id })
        .sort(doc! { "updated_at": -1 })
        .await?;

    let mut details = Vec::new();
    while let Some(conversation) = cursor.next().await {
        let conversation = conversation?;

        let last_message = chat_messages(&data.mongodb)
            .find_one(doc! { "conversation_id": &conversation.id })
            .sort(doc! { "created_at": -1 })
            .await?;

        let post = posts(&data.mongodb)
            .find_one(doc! { "_id": &conversation.post_id })
            .await?;

        // The counterpart is the first participant who is not the caller;
        // a thread with no one else falls back to the post owner.
        let other_id = conversation
            .participants
            .iter()
            .find(|p| **p != user_id)
            .cloned()
            .or_else(|| post.as_ref().map(|p| p.user_id.clone()));
        let other_participant = match other_id {
            Some(other_id) => users(&data.mongodb)
                .find_one(doc! { "_id": &other_id })
                .await?
                .map(UserProfile::from),
            None => None,
        };

        let (post_title, post_sport) = post
            .map(|p| (p.title, p.sport))
            .unwrap_or_default();

        details.push(ConversationDetails {
            conversation,
            last_message,
            other_participant,
            post_title,
            post_sport,
        });
    }
    Ok(HttpResponse::Ok().json(details))
}

/// GET /chat/conversations/{conversation_id}
pub async fn get_conversation(
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let conversation = conversations(&data.mongodb)
        .find_one(doc! { "_id": &*conversation_id })
        .await?
        .ok_or(ApiError::NotFound("conversation"))?;
    Ok(HttpResponse::Ok().json(conversation))
}

/// Sending a message requires membership; this repairs it instead of
/// rejecting the sender. Folds the sender into the conversation's
/// participants and the post's interested set, and bumps the thread's
/// `updated_at`.
pub async fn ensure_membership(
    db: &MongoDB,
    conversation: &Conversation,
    sender_id: &str,
) -> Result<(), ApiError> {
    conversations(db)
        .update_one(
            doc! { "_id": &conversation.id },
            doc! {
                "$set": { "updated_at": to_bson(&Utc::now())? },
                "$addToSet": { "participants": sender_id },
            },
        )
        .await?;
    posts(db)
        .update_one(
            doc! { "_id": &conversation.post_id },
            doc! { "$addToSet": { "interested_user_id": sender_id } },
        )
        .await?;
    Ok(())
}

/// Persists a message and keeps the sender enrolled in the thread. Shared
/// by the REST handler and the socket server.
pub async fn store_message(
    db: &MongoDB,
    payload: SendMessageRequest,
) -> Result<(ChatMessage, Conversation), ApiError> {
    let conversation = conversations(db)
        .find_one(doc! { "_id": &payload.conversation_id })
        .await?
        .ok_or_else(|| ApiError::Validation("unknown conversation".to_string()))?;

    let now = Utc::now();
    let message = ChatMessage {
        id: Uuid::new_v4().to_string(),
        conversation_id: payload.conversation_id.clone(),
        sender_id: payload.sender_id.clone(),
        content: payload.content,
        created_at: now,
        updated_at: now,
    };
    chat_messages(db).insert_one(&message).await?;

    ensure_membership(db, &conversation, &payload.sender_id).await?;

    Ok((message, conversation))
}

/// POST /chat/messages
pub async fn send_message(
    data: web::Data<AppState>,
    payload: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    let (message, conversation) = store_message(&data.mongodb, payload.into_inner()).await?;
    broadcast_new_message(&data, &conversation, &message);
    Ok(HttpResponse::Ok().json(message))
}

/// GET /chat/messages/{conversation_id}
pub async fn messages_for_conversation(
    data: web::Data<AppState>,
    conversation_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let mut cursor = chat_messages(&data.mongodb)
        .find(doc! { "conversation_id": &*conversation_id })
        .sort(doc! { "created_at": 1 })
        .limit(100)
        .await?;
    let mut all = Vec::new();
    while let Some(message) = cursor.next().await {
        all.push(message?);
    }
    Ok(HttpResponse::Ok().json(all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn conversation(state: MatchState, waiting_by: Option<&str>) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: "conv-1".to_string(),
            post_id: "post-1".to_string(),
            participants: vec!["owner".to_string(), "guest".to_string()],
            is_match: state,
            confirm_by: None,
            waiting_by: waiting_by.map(|w| w.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn update(is_match: Option<MatchState>, waiting_by: Option<&str>, confirm_by: Option<&str>) -> UpdateConversationRequest {
        UpdateConversationRequest {
            is_match,
            waiting_by: waiting_by.map(|w| w.to_string()),
            confirm_by: confirm_by.map(|c| c.to_string()),
            participants: None,
        }
    }

    #[test]
    fn test_propose_from_no_records_proposer() {
        let current = conversation(MatchState::No, None);
        let plan = plan_update(&current, &update(Some(MatchState::Waiting), Some("guest"), None));
        assert_eq!(plan.unwrap(), UpdatePlan::Propose { waiting_by: "guest".to_string() });
    }

    #[test]
    fn test_propose_rejected_when_already_waiting() {
        let current = conversation(MatchState::Waiting, Some("guest"));
        let err = plan_update(&current, &update(Some(MatchState::Waiting), Some("owner"), None))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_propose_rejected_when_already_confirmed() {
        let current = conversation(MatchState::Confirm, None);
        let err = plan_update(&current, &update(Some(MatchState::Waiting), Some("guest"), None))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_propose_rejected_for_outsider() {
        let current = conversation(MatchState::No, None);
        let err = plan_update(&current, &update(Some(MatchState::Waiting), Some("stranger"), None))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_confirm_from_waiting_credits_the_proposer() {
        let current = conversation(MatchState::Waiting, Some("guest"));
        // Even if the caller names someone else, the recorded proposer wins.
        let plan = plan_update(&current, &update(Some(MatchState::Confirm), None, Some("owner")));
        assert_eq!(plan.unwrap(), UpdatePlan::Confirm { confirm_by: "guest".to_string() });
    }

    #[test]
    fn test_confirm_outside_waiting_takes_caller_confirmer() {
        let current = conversation(MatchState::No, None);
        let plan = plan_update(&current, &update(Some(MatchState::Confirm), None, Some("guest")));
        assert_eq!(plan.unwrap(), UpdatePlan::Confirm { confirm_by: "guest".to_string() });
    }

    #[test]
    fn test_confirm_without_proposer_or_confirmer_is_a_merge() {
        let current = conversation(MatchState::No, None);
        let plan = plan_update(&current, &update(Some(MatchState::Confirm), None, None));
        assert_eq!(plan.unwrap(), UpdatePlan::General);
    }

    #[test]
    fn test_waiting_without_proposer_is_a_merge() {
        let current = conversation(MatchState::No, None);
        let plan = plan_update(&current, &update(Some(MatchState::Waiting), None, None));
        assert_eq!(plan.unwrap(), UpdatePlan::General);
    }

    #[test]
    fn test_plain_field_update_is_a_merge() {
        let current = conversation(MatchState::Waiting, Some("guest"));
        let plan = plan_update(&current, &update(None, None, None));
        assert_eq!(plan.unwrap(), UpdatePlan::General);
    }

    fn post_with(status: &str, match_id: Option<&str>) -> Post {
        let now = Utc::now();
        Post {
            id: "post-1".to_string(),
            user_id: "owner".to_string(),
            sport: "tennis".to_string(),
            title: "Weekend singles".to_string(),
            content: None,
            start_time: Utc.with_ymd_and_hms(2025, 6, 7, 8, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 6, 7, 10, 0, 0).unwrap(),
            location: None,
            status: status.to_string(),
            interested_user_id: vec![],
            image: None,
            match_id: match_id.map(|m| m.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_post_gate_open_while_active_and_unmatched() {
        assert!(post_accepts_confirmation(&post_with("active", None)));
    }

    #[test]
    fn test_post_gate_closed_once_inactive() {
        assert!(!post_accepts_confirmation(&post_with("inactive", None)));
        assert!(!post_accepts_confirmation(&post_with("Inactive", None)));
    }

    #[test]
    fn test_post_gate_closed_once_matched() {
        assert!(!post_accepts_confirmation(&post_with("active", Some("match-1"))));
    }

    #[test]
    fn test_sibling_reset_spares_the_winner() {
        let (filter, update) = sibling_reset("post-1", "conv-1").unwrap();
        assert_eq!(filter.get_str("post_id").unwrap(), "post-1");
        let ne = filter.get_document("_id").unwrap();
        assert_eq!(ne.get_str("$ne").unwrap(), "conv-1");

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("is_match").unwrap(), "no");
        let unset = update.get_document("$unset").unwrap();
        assert!(unset.contains_key("waiting_by"));
        assert!(unset.contains_key("confirm_by"));
    }

    #[test]
    fn test_participants_always_include_the_owner_once() {
        let merged = merged_participants(&["guest".to_string()], "owner");
        assert_eq!(merged, vec!["guest".to_string(), "owner".to_string()]);

        let merged = merged_participants(
            &["guest".to_string(), "owner".to_string(), "guest".to_string()],
            "owner",
        );
        assert_eq!(merged, vec!["guest".to_string(), "owner".to_string()]);

        let merged = merged_participants(&[], "owner");
        assert_eq!(merged, vec!["owner".to_string()]);
    }

    #[test]
    fn test_match_state_wire_format() {
        assert_eq!(serde_json::to_string(&MatchState::Waiting).unwrap(), "\"waiting\"");
        let state: MatchState = serde_json::from_str("\"confirm\"").unwrap();
        assert_eq!(state, MatchState::Confirm);
        assert_eq!(MatchState::default(), MatchState::No);
        assert_eq!(MatchState::No.as_str(), "no");
    }
}
