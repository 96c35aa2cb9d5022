//! Local (UI-facing) handlers (`/local/*`).
//!
//! The thin surface a frontend needs to drive the federation engine:
//! profiles, posts, comments, connection management and read state.
//! Session handling is an external concern; routes take the acting
//! profile's handle in the path.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use entente_shared::protocol::{AuthorInfo, CommentPayload, PostPayload, RetrievePosts};
use entente_shared::{envelope, ConnectionStatus, KeyPair, Sealed};
use entente_store::{Comment, Datastore, Post, Profile};

use crate::api::AppState;
use crate::error::ApiError;
use crate::workers::{
    AckConnectionTask, CommentCreatedTask, PostCreatedTask, RequestConnectionTask,
    QUEUE_ACK_CONNECTION, QUEUE_COMMENT_CREATED, QUEUE_POST_CREATED, QUEUE_REQUEST_CONNECTION,
    WORKER_ACK_CONNECTION, WORKER_COMMENT_CREATED, WORKER_POST_CREATED,
    WORKER_REQUEST_CONNECTION,
};

fn profile_for(store: &dyn Datastore, handle: &str) -> Result<Profile, ApiError> {
    store
        .profile_by_handle(handle)
        .ok_or_else(|| ApiError::NotFound(format!("No such handle ({handle})")))
}

/// Queue a task, logging instead of failing the request when the
/// dispatcher is unhappy -- delivery is the dispatcher's contract, not
/// this handler's.
async fn queue(state: &AppState, payload: Value, queue_name: &str, uri: &str) {
    if let Err(e) = state.dispatcher.queue_task(payload, queue_name, uri).await {
        warn!(queue = queue_name, error = %e, "task dispatch failed");
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub handle: String,
    pub display_name: String,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub handle: String,
    pub display_name: String,
    pub public_key_pem: String,
}

/// `POST /local/profiles` -- create a profile with a fresh RSA key pair.
pub async fn create_profile(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let keys = KeyPair::generate()
        .map_err(|_| ApiError::Internal("key generation failed".to_string()))?;

    let profile = Profile {
        id: Uuid::new_v4(),
        handle: request.handle,
        display_name: request.display_name,
        public_key_pem: keys
            .public_key_pem()
            .map_err(|_| ApiError::Internal("key encoding failed".to_string()))?,
        private_key_pem: keys
            .private_key_pem()
            .map_err(|_| ApiError::Internal("key encoding failed".to_string()))?,
        created: Utc::now(),
    };
    state.store.create_profile(profile.clone())?;

    info!(handle = %profile.handle, "profile created");
    Ok(Json(ProfileResponse {
        id: profile.id,
        handle: profile.handle,
        display_name: profile.display_name,
        public_key_pem: profile.public_key_pem,
    }))
}

// ---------------------------------------------------------------------------
// Posts and comments
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub text: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// `POST /local/{handle}/posts` -- create a post and queue notification
/// fan-out to every connected peer.
pub async fn create_post(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(request): Json<CreatePostRequest>,
) -> Result<Json<PostPayload>, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;

    let post = Post {
        id: Uuid::new_v4(),
        profile_id: profile.id,
        text: request.text,
        files: request.files,
        created: Utc::now(),
    };
    state.store.insert_post(post.clone())?;

    let task = serde_json::to_value(PostCreatedTask { post_id: post.id })
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    queue(&state, task, QUEUE_POST_CREATED, WORKER_POST_CREATED).await;

    Ok(Json(PostPayload {
        id: post.id,
        author: AuthorInfo {
            handle: profile.handle,
            display_name: profile.display_name,
        },
        text: post.text,
        files: state.signer.sign_urls(&post.files),
        created: post.created,
        comments: vec![],
    }))
}

/// `GET /local/{handle}/posts` -- own posts, newest first, file
/// references signed for fetching.
pub async fn get_posts(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<Vec<PostPayload>>, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;

    let posts = state
        .store
        .list_posts(profile.id)
        .into_iter()
        .map(|post| PostPayload {
            id: post.id,
            author: AuthorInfo {
                handle: profile.handle.clone(),
                display_name: profile.display_name.clone(),
            },
            text: post.text,
            files: state.signer.sign_urls(&post.files),
            created: post.created,
            comments: vec![],
        })
        .collect();
    Ok(Json(posts))
}

#[derive(Deserialize)]
pub struct AddCommentRequest {
    pub connection_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// `POST /local/{handle}/posts/{post_id}/comments` -- comment on a
/// connection's post and queue the notification to its author's host.
pub async fn add_comment(
    State(state): State<AppState>,
    Path((handle, post_id)): Path<(String, Uuid)>,
    Json(request): Json<AddCommentRequest>,
) -> Result<Json<CommentPayload>, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;
    let connection = state
        .store
        .connection_by_id(profile.id, request.connection_id)
        .ok_or_else(|| {
            ApiError::NotFound(format!("Connection id ({}) not found", request.connection_id))
        })?;

    let comment = Comment {
        id: Uuid::new_v4(),
        post_id,
        profile_id: profile.id,
        text: request.text,
        files: request.files,
        created: Utc::now(),
    };
    state.store.insert_comment(comment.clone())?;

    let task = serde_json::to_value(CommentCreatedTask {
        profile_id: profile.id,
        post_id,
        comment_id: comment.id,
        connection_id: connection.id,
    })
    .map_err(|e| ApiError::Internal(e.to_string()))?;
    queue(&state, task, QUEUE_COMMENT_CREATED, WORKER_COMMENT_CREATED).await;

    Ok(Json(CommentPayload {
        id: comment.id,
        post_id,
        author: AuthorInfo {
            handle: profile.handle,
            display_name: profile.display_name,
        },
        text: comment.text,
        files: state.signer.sign_urls(&comment.files),
        created: comment.created,
    }))
}

/// `POST /local/{handle}/mark-post-read/{post_id}` -- flip the read flag
/// on a post notification receipt.  Idempotent.
pub async fn mark_post_read(
    State(state): State<AppState>,
    Path((_handle, post_id)): Path<(String, Uuid)>,
) -> Result<String, ApiError> {
    let mut reference = state
        .store
        .post_reference_for(post_id)
        .ok_or_else(|| ApiError::NotFound(format!("No such post id ({post_id})")))?;

    reference.read = true;
    state.store.update_post_reference(&reference)?;
    Ok(format!("post id {post_id} marked read"))
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RequestConnectionRequest {
    pub host: String,
    pub handle: String,
}

/// `POST /local/{handle}/request-connection` -- queue the outbound
/// bootstrap request to another host.
pub async fn request_connection(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(request): Json<RequestConnectionRequest>,
) -> Result<String, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;

    let task = serde_json::to_value(RequestConnectionTask {
        profile_id: profile.id,
        host: request.host,
        handle: request.handle,
    })
    .map_err(|e| ApiError::Internal(e.to_string()))?;
    queue(
        &state,
        task,
        QUEUE_REQUEST_CONNECTION,
        WORKER_REQUEST_CONNECTION,
    )
    .await;

    Ok("connection requested".to_string())
}

#[derive(Deserialize)]
pub struct ManageConnectionRequest {
    pub connection_id: Uuid,
    pub action: String,
}

/// `POST /local/{handle}/manage-connection` -- accept, decline or delete
/// a connection.
///
/// Accepting queues the acknowledgement; the status flip to `Connected`
/// happens in the worker only after the peer has received the ack, so a
/// lost ack leaves the record `Pending` rather than claiming a trust
/// relationship the peer never heard about.
pub async fn manage_connection(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(request): Json<ManageConnectionRequest>,
) -> Result<String, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;
    let mut connection = state
        .store
        .connection_by_id(profile.id, request.connection_id)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No connection found for connectionId {}",
                request.connection_id
            ))
        })?;

    match request.action.as_str() {
        "connect" => {
            if !connection.status.can_transition_to(ConnectionStatus::Connected) {
                return Err(ApiError::Validation(format!(
                    "cannot connect from status {}",
                    connection.status
                )));
            }
            connection.read = true;
            state.store.update_connection(&connection)?;

            let task = serde_json::to_value(AckConnectionTask {
                profile_id: profile.id,
                connection_id: connection.id,
            })
            .map_err(|e| ApiError::Internal(e.to_string()))?;
            queue(&state, task, QUEUE_ACK_CONNECTION, WORKER_ACK_CONNECTION).await;
        }
        "decline" => {
            if !connection.status.can_transition_to(ConnectionStatus::Declined) {
                return Err(ApiError::Validation(format!(
                    "cannot decline from status {}",
                    connection.status
                )));
            }
            connection.status = ConnectionStatus::Declined;
            connection.read = true;
            connection.updated = Utc::now();
            state.store.update_connection(&connection)?;
        }
        "delete" => {
            state.store.delete_connection(profile.id, connection.id)?;
        }
        other => {
            return Err(ApiError::Validation(format!(
                "Invalid action requested - {other}"
            )));
        }
    }

    Ok(format!("{} completed", request.action))
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub host: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub status: ConnectionStatus,
    pub read: bool,
    pub unread_post_count: usize,
    pub created: chrono::DateTime<Utc>,
    pub updated: chrono::DateTime<Utc>,
}

/// `GET /local/{handle}/connections` -- pending and connected peers with
/// unread notification counts.  Requested and declined records are
/// internal bookkeeping and stay hidden.
pub async fn get_connections(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<Vec<ConnectionInfo>>, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;

    let connections = state
        .store
        .list_connections(profile.id)
        .into_iter()
        .filter(|c| {
            !matches!(
                c.status,
                ConnectionStatus::Requested | ConnectionStatus::Declined
            )
        })
        .map(|c| {
            let unread = if c.status == ConnectionStatus::Connected {
                state.store.count_unread_post_references(c.id)
            } else {
                0
            };
            ConnectionInfo {
                id: c.id,
                host: c.host,
                handle: c.handle,
                display_name: c.display_name,
                status: c.status,
                read: c.read,
                unread_post_count: unread,
                created: c.created,
                updated: c.updated,
            }
        })
        .collect();
    Ok(Json(connections))
}

/// `GET /local/{handle}/connection-posts/{connection_id}` -- fetch a
/// connected peer's posts over the federation protocol (the requesting
/// side of `retrieve-posts`).
pub async fn connection_posts(
    State(state): State<AppState>,
    Path((handle, connection_id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<PostPayload>>, ApiError> {
    let profile = profile_for(state.store.as_ref(), &handle)?;
    let connection = state
        .store
        .connection_by_id(profile.id, connection_id)
        .ok_or_else(|| ApiError::NotFound(format!("No connection found ({connection_id})")))?;

    let keys = KeyPair::from_private_pem(&profile.private_key_pem)
        .map_err(|_| ApiError::Internal("profile key unavailable".to_string()))?;

    let payload = RetrievePosts {
        host: state.config.public_host.clone(),
        handle: profile.handle.clone(),
    };
    let response = crate::fanout::post_envelope(
        &state,
        &keys,
        &connection,
        "/api/retrieve-posts",
        &payload,
    )
    .await
    .map_err(|e| ApiError::Peer(format!("Failed to retrieve connection posts: {e}")))?;

    let sealed: Sealed = response
        .json()
        .await
        .map_err(|e| ApiError::Peer(format!("Failed to decode response: {e}")))?;
    let plaintext = envelope::open(&keys, &sealed)
        .map_err(|_| ApiError::Peer("Failed to decode response".to_string()))?;
    let posts: Vec<PostPayload> = serde_json::from_slice(&plaintext)
        .map_err(|e| ApiError::Peer(format!("Failed to decode response: {e}")))?;

    Ok(Json(posts))
}
