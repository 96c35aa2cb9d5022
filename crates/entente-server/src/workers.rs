//! Queue-worker handlers (`/worker/*`).
//!
//! Each handler performs exactly one outbound call (or enumerates the
//! calls to make and re-queues them one per peer), so the external
//! dispatcher can retry any single peer without touching the others.  The
//! engine is stateless per call: build envelope, POST, inspect the status
//! code, report the result.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use entente_shared::protocol::{CommentNotify, ConnectionAck, ConnectionRequest, PostNotify};
use entente_shared::{envelope, ConnectionStatus, KeyPair};
use entente_store::{Connection, Datastore, Profile};

use crate::api::AppState;
use crate::config::scheme_for;
use crate::error::ApiError;
use crate::fanout;

pub const QUEUE_REQUEST_CONNECTION: &str = "request-connection";
pub const QUEUE_ACK_CONNECTION: &str = "ack-connection";
pub const QUEUE_POST_CREATED: &str = "post-created";
pub const QUEUE_POST_NOTIFY: &str = "post-notify";
pub const QUEUE_COMMENT_CREATED: &str = "comment-created";

pub const WORKER_REQUEST_CONNECTION: &str = "/worker/request-connection";
pub const WORKER_ACK_CONNECTION: &str = "/worker/ack-connection";
pub const WORKER_POST_CREATED: &str = "/worker/post-created";
pub const WORKER_POST_NOTIFY: &str = "/worker/post-notify";
pub const WORKER_COMMENT_CREATED: &str = "/worker/comment-created";

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestConnectionTask {
    pub profile_id: Uuid,
    pub host: String,
    pub handle: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckConnectionTask {
    pub profile_id: Uuid,
    pub connection_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostCreatedTask {
    pub post_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostNotifyTask {
    pub profile_id: Uuid,
    pub post_id: Uuid,
    pub connection_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentCreatedTask {
    pub profile_id: Uuid,
    pub post_id: Uuid,
    pub comment_id: Uuid,
    pub connection_id: Uuid,
}

fn load_profile(state: &AppState, profile_id: Uuid) -> Result<(Profile, KeyPair), ApiError> {
    let profile = state
        .store
        .profile_by_id(profile_id)
        .ok_or_else(|| ApiError::NotFound(format!("No profile {profile_id}")))?;
    let keys = KeyPair::from_private_pem(&profile.private_key_pem)
        .map_err(|_| ApiError::Internal("profile key unavailable".to_string()))?;
    Ok((profile, keys))
}

fn load_connection(
    state: &AppState,
    profile_id: Uuid,
    connection_id: Uuid,
) -> Result<Connection, ApiError> {
    state
        .store
        .connection_by_id(profile_id, connection_id)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No connection {connection_id} found for profile {profile_id}"
            ))
        })
}

/// `POST /worker/request-connection` -- send the unauthenticated bootstrap
/// request to a peer.  The local `Requested` record is only created after
/// the peer accepts the request.
pub async fn request_connection(
    State(state): State<AppState>,
    Json(task): Json<RequestConnectionTask>,
) -> Result<String, ApiError> {
    // bootstrap is unsigned, the private key stays untouched here
    let profile = state
        .store
        .profile_by_id(task.profile_id)
        .ok_or_else(|| ApiError::NotFound(format!("No profile {}", task.profile_id)))?;

    let payload = ConnectionRequest {
        requestor_host: state.config.public_host.clone(),
        requestor_handle: profile.handle.clone(),
        requestor_display_name: profile.display_name.clone(),
        requestor_public_key: profile.public_key_pem.clone(),
    };
    let enc_payload = envelope::encode_bootstrap(&payload)
        .map_err(|_| ApiError::Internal("unable to encode request".to_string()))?;

    let url = format!(
        "{}://{}/api/request-connection",
        scheme_for(&task.host),
        task.host
    );
    let body = serde_json::json!({
        "enc_payload": enc_payload,
        "handle": task.handle,
    });
    let response = state
        .http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| ApiError::Peer(e.to_string()))?;

    if !response.status().is_success() {
        error!(
            peer = %format!("{}@{}", task.handle, task.host),
            status = response.status().as_u16(),
            "connection request failed"
        );
        return Err(ApiError::Peer("Connection request failed".to_string()));
    }

    // the peer accepted; remember who we asked, key to be learned from
    // their acknowledgement
    state
        .store
        .insert_connection(Connection::new(profile.id, task.host, task.handle))?;
    Ok("Connection requested".to_string())
}

/// `POST /worker/ack-connection` -- deliver an acknowledgement envelope to
/// a peer whose request was approved locally.  The status write is the
/// last step: the record only becomes `Connected` once the peer has
/// actually received the ack.
pub async fn ack_connection(
    State(state): State<AppState>,
    Json(task): Json<AckConnectionTask>,
) -> Result<String, ApiError> {
    let (profile, keys) = load_profile(&state, task.profile_id)?;
    let mut connection = load_connection(&state, profile.id, task.connection_id)?;

    if !connection.status.can_transition_to(ConnectionStatus::Connected) {
        return Err(ApiError::Validation(format!(
            "connection {} cannot be acknowledged from status {}",
            connection.id, connection.status
        )));
    }

    let payload = ConnectionAck {
        ack_host: state.config.public_host.clone(),
        ack_handle: profile.handle.clone(),
        ack_display_name: profile.display_name.clone(),
        ack_public_key: profile.public_key_pem.clone(),
    };

    fanout::notify_peer(&state, &keys, &connection, "/api/acknowledge-connection", &payload)
        .await
        .map_err(|e| {
            error!(
                peer = %format!("{}@{}", connection.handle, connection.host),
                error = %e,
                "failed to deliver acknowledgement"
            );
            ApiError::Peer("Failed to ack requested connection".to_string())
        })?;

    connection.status = ConnectionStatus::Connected;
    connection.updated = Utc::now();
    state.store.update_connection(&connection)?;

    info!(
        profile = %profile.handle,
        peer = %format!("{}@{}", connection.handle, connection.host),
        "connection acknowledged"
    );
    Ok("Connection acknowledged".to_string())
}

/// `POST /worker/post-created` -- enumerate connected peers and queue one
/// independent notify task per peer, so one unreachable peer can never
/// block the others.
pub async fn post_created(
    State(state): State<AppState>,
    Json(task): Json<PostCreatedTask>,
) -> Result<String, ApiError> {
    let post = state
        .store
        .post_by_id(task.post_id)
        .ok_or_else(|| ApiError::NotFound(format!("post {} not found", task.post_id)))?;

    let connections = state.store.list_connections(post.profile_id);
    for connection in connections
        .iter()
        .filter(|c| c.status == ConnectionStatus::Connected)
    {
        let notify = PostNotifyTask {
            profile_id: post.profile_id,
            post_id: post.id,
            connection_id: connection.id,
        };
        let payload = serde_json::to_value(&notify)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        if let Err(e) = state
            .dispatcher
            .queue_task(payload, QUEUE_POST_NOTIFY, WORKER_POST_NOTIFY)
            .await
        {
            // isolation: a peer we cannot even queue for must not stop
            // the rest of the fan-out
            error!(
                peer = %format!("{}@{}", connection.handle, connection.host),
                error = %e,
                "failed to queue post notification"
            );
        }
    }
    Ok("Notification tasks created".to_string())
}

/// `POST /worker/post-notify` -- tell one peer about one new post.
pub async fn post_notify(
    State(state): State<AppState>,
    Json(task): Json<PostNotifyTask>,
) -> Result<String, ApiError> {
    let (profile, keys) = load_profile(&state, task.profile_id)?;
    let connection = load_connection(&state, profile.id, task.connection_id)?;

    let payload = PostNotify {
        post_host: state.config.public_host.clone(),
        post_handle: profile.handle.clone(),
        post_id: task.post_id,
    };

    fanout::notify_peer(&state, &keys, &connection, "/api/post-notify", &payload)
        .await
        .map_err(|e| ApiError::Peer(format!("Post notify failed: {e}")))?;

    Ok(format!(
        "Connection {}@{} notified",
        connection.handle, connection.host
    ))
}

/// `POST /worker/comment-created` -- tell the post's author that one of
/// our profiles commented on it.
pub async fn comment_created(
    State(state): State<AppState>,
    Json(task): Json<CommentCreatedTask>,
) -> Result<String, ApiError> {
    let (profile, keys) = load_profile(&state, task.profile_id)?;
    let connection = load_connection(&state, profile.id, task.connection_id)?;

    let payload = CommentNotify {
        comment_host: state.config.public_host.clone(),
        comment_handle: profile.handle.clone(),
        post_id: task.post_id,
        comment_id: task.comment_id,
    };

    fanout::notify_peer(&state, &keys, &connection, "/api/comment-created", &payload)
        .await
        .map_err(|e| ApiError::Peer(format!("New comment notify failed: {e}")))?;

    Ok(format!(
        "Connection {}@{} notified of comment {} on post {}",
        connection.handle, connection.host, task.comment_id, task.post_id
    ))
}
