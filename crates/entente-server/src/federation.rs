//! Inbound federation handlers (`/api/*`).
//!
//! Everything arriving here was sent by another host.  Each handler runs
//! the validation pipeline (see [`crate::validate`]) and then acts on the
//! authenticated `(connectee, payload, requestor)` tuple.  The bootstrap
//! connection request is the single exception: it is unauthenticated by
//! construction and the only operation allowed to create state from an
//! unverified payload.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use entente_shared::protocol::{
    AuthorInfo, CommentNotify, CommentPayload, ConnectionAck, ConnectionRequest, PostNotify,
    PostPayload, RetrieveComments,
};
use entente_shared::{envelope, ConnectionStatus, Sealed};
use entente_store::{
    Comment, CommentReference, Connection, Datastore, Post, PostReference, Profile,
};

use crate::api::AppState;
use crate::error::ApiError;
use crate::fanout;
use crate::validate::{require_connected, require_fields, resolve_handle, validate_enveloped};

/// `POST /api/request-connection` -- handshake bootstrap.
///
/// The sender has no key of ours and we have none of theirs, so the
/// payload is base64-encoded JSON, not an envelope.  Creates a `Pending`
/// connection holding the peer's claimed identity and key; nothing about
/// the claim is trusted until a human approves it.
pub async fn request_connection(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<String, ApiError> {
    require_fields(&body, &["enc_payload", "handle"])?;
    let connectee = resolve_handle(state.store.as_ref(), body["handle"].as_str().unwrap_or(""))?;

    let bytes = envelope::decode_bootstrap(body["enc_payload"].as_str().unwrap_or(""))?;
    let payload: Value = serde_json::from_slice(&bytes)
        .map_err(|_| ApiError::Validation("unable to convert payload to JSON".to_string()))?;
    require_fields(
        &payload,
        &[
            "requestor_host",
            "requestor_handle",
            "requestor_display_name",
            "requestor_public_key",
        ],
    )?;
    let request: ConnectionRequest = serde_json::from_value(payload)
        .map_err(|_| ApiError::Validation("malformed connection request".to_string()))?;

    let now = Utc::now();
    let connection = Connection {
        id: Uuid::new_v4(),
        profile_id: connectee.id,
        host: request.requestor_host.clone(),
        handle: request.requestor_handle.clone(),
        display_name: Some(request.requestor_display_name),
        public_key_pem: Some(request.requestor_public_key),
        status: ConnectionStatus::Pending,
        read: false,
        created: now,
        updated: now,
    };
    state.store.insert_connection(connection)?;

    info!(
        connectee = %connectee.handle,
        peer = %format!("{}@{}", request.requestor_handle, request.requestor_host),
        "connection requested"
    );
    Ok("Request completed".to_string())
}

/// `POST /api/acknowledge-connection` -- a peer accepted our request.
///
/// No signature check: this is the first envelope the peer has ever sent
/// us, so there is no stored key to verify against.  Trust-on-first-use:
/// a `Requested` connection adopts the claimed key at face value; every
/// later envelope must verify against it.  Idempotent when already
/// connected.
pub async fn acknowledge_connection(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<String, ApiError> {
    let request = validate_enveloped(
        state.store.as_ref(),
        &body,
        &["ack_host", "ack_handle", "ack_display_name", "ack_public_key"],
    )?;
    let ack: ConnectionAck = serde_json::from_value(request.payload.clone())
        .map_err(|_| ApiError::Validation("malformed acknowledgement".to_string()))?;

    let mut connection = state
        .store
        .find_connection(request.connectee.id, &ack.ack_host, &ack.ack_handle)
        .ok_or_else(|| ApiError::NotFound("No connection found".to_string()))?;

    if connection.status == ConnectionStatus::Connected {
        return Ok("Already connected".to_string());
    }
    if !connection.status.adopts_key_on_first_sight() {
        return Err(ApiError::Validation(
            "connection is not awaiting acknowledgement".to_string(),
        ));
    }

    connection.display_name = Some(ack.ack_display_name);
    connection.public_key_pem = Some(ack.ack_public_key);
    connection.status = ConnectionStatus::Connected;
    connection.updated = Utc::now();
    state.store.update_connection(&connection)?;

    info!(
        connectee = %request.connectee.handle,
        peer = %format!("{}@{}", ack.ack_handle, ack.ack_host),
        "adopted peer key on first sighting, connection established"
    );
    Ok("Request completed".to_string())
}

/// `POST /api/retrieve-posts` -- a connected peer asks for this profile's
/// posts, enriched with comments gathered from every peer that has
/// commented (see [`fanout::gather_remote_comments`]).
pub async fn retrieve_posts(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Sealed>, ApiError> {
    let request = validate_enveloped(state.store.as_ref(), &body, &["host", "handle"])?;
    let requestor = require_connected(state.store.as_ref(), &request, "host", "handle")?;

    let posts = state.store.list_posts(request.connectee.id);
    let post_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();

    let mut remote_comments =
        fanout::gather_remote_comments(&state, &request.connectee, &request.keys, &post_ids).await;

    let response: Vec<PostPayload> = posts
        .into_iter()
        .map(|post| {
            post_payload(&state, &request.connectee, post, &mut remote_comments)
        })
        .collect();

    seal_response(&request.keys, &requestor, &response)
}

fn post_payload(
    state: &AppState,
    author: &Profile,
    post: Post,
    remote_comments: &mut std::collections::HashMap<Uuid, Vec<CommentPayload>>,
) -> PostPayload {
    PostPayload {
        id: post.id,
        author: AuthorInfo {
            handle: author.handle.clone(),
            display_name: author.display_name.clone(),
        },
        text: post.text,
        files: state.signer.sign_urls(&post.files),
        created: post.created,
        comments: remote_comments.remove(&post.id).unwrap_or_default(),
    }
}

fn seal_response<T: serde::Serialize>(
    keys: &entente_shared::KeyPair,
    requestor: &Connection,
    payload: &T,
) -> Result<Json<Sealed>, ApiError> {
    let public_key = requestor
        .public_key_pem
        .as_deref()
        .ok_or_else(|| ApiError::Internal("connection is missing a public key".to_string()))?;
    let sealed = envelope::seal(keys, public_key, payload)
        .map_err(|_| ApiError::Internal("unable to seal response".to_string()))?;
    Ok(Json(sealed))
}

/// `POST /api/post-notify` -- a connected peer published a new post.
/// Records a [`PostReference`] receipt against the notifying connection.
pub async fn post_notify(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<String, ApiError> {
    let request = validate_enveloped(
        state.store.as_ref(),
        &body,
        &["post_host", "post_handle", "post_id"],
    )?;
    let requestor = require_connected(state.store.as_ref(), &request, "post_host", "post_handle")?;

    let notify: PostNotify = serde_json::from_value(request.payload.clone())
        .map_err(|_| ApiError::Validation("malformed notification".to_string()))?;

    state
        .store
        .insert_post_reference(PostReference::new(requestor.id, notify.post_id))?;
    Ok(String::new())
}

/// `POST /api/comment-created` -- a connected peer commented on one of our
/// posts.  The referenced post must exist here, otherwise the notification
/// is rejected and no receipt is created.
pub async fn comment_created(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<String, ApiError> {
    let request = validate_enveloped(
        state.store.as_ref(),
        &body,
        &["comment_host", "comment_handle", "post_id", "comment_id"],
    )?;
    let requestor = require_connected(
        state.store.as_ref(),
        &request,
        "comment_host",
        "comment_handle",
    )?;

    let notify: CommentNotify = serde_json::from_value(request.payload.clone())
        .map_err(|_| ApiError::Validation("malformed notification".to_string()))?;

    if state.store.post_by_id(notify.post_id).is_none() {
        return Err(ApiError::NotFound(format!(
            "No post found for id {}",
            notify.post_id
        )));
    }

    state
        .store
        .insert_comment_reference(CommentReference::new(requestor.id, notify.post_id))?;
    Ok(String::new())
}

/// `POST /api/retrieve-comments` -- a connected peer asks for the comments
/// our users left on the given posts (the receiving half of retrieval
/// fan-out).
pub async fn retrieve_comments(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Sealed>, ApiError> {
    let request = validate_enveloped(state.store.as_ref(), &body, &["host", "handle", "post_ids"])?;
    let requestor = require_connected(state.store.as_ref(), &request, "host", "handle")?;

    let asked: RetrieveComments = serde_json::from_value(request.payload.clone())
        .map_err(|_| ApiError::Validation("malformed comment request".to_string()))?;

    let mut all_comments: Vec<CommentPayload> = Vec::new();
    for post_id in asked.post_ids {
        for comment in state.store.comments_for_post(post_id) {
            all_comments.push(comment_payload(&state, comment)?);
        }
    }

    seal_response(&request.keys, &requestor, &all_comments)
}

fn comment_payload(state: &AppState, comment: Comment) -> Result<CommentPayload, ApiError> {
    let author = state
        .store
        .profile_by_id(comment.profile_id)
        .ok_or_else(|| ApiError::Internal("comment author profile missing".to_string()))?;
    Ok(CommentPayload {
        id: comment.id,
        post_id: comment.post_id,
        author: AuthorInfo {
            handle: author.handle,
            display_name: author.display_name,
        },
        text: comment.text,
        files: state.signer.sign_urls(&comment.files),
        created: comment.created,
    })
}
