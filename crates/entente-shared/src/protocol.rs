//! Typed payloads carried inside envelopes.
//!
//! Field names are the wire contract; both sides of the federation speak
//! these JSON shapes inside the encrypted payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bootstrap connection request.  Sent base64-encoded but unencrypted;
/// the recipient has no key for us yet (see [`crate::envelope::encode_bootstrap`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub requestor_host: String,
    pub requestor_handle: String,
    pub requestor_display_name: String,
    pub requestor_public_key: String,
}

/// Connection acknowledgement, sealed to the key the requestor presented
/// in their bootstrap request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionAck {
    pub ack_host: String,
    pub ack_handle: String,
    pub ack_display_name: String,
    pub ack_public_key: String,
}

/// Ask a peer for the posts of one of its profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievePosts {
    pub host: String,
    pub handle: String,
}

/// Tell a peer one of our profiles published a new post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostNotify {
    pub post_host: String,
    pub post_handle: String,
    pub post_id: Uuid,
}

/// Tell a peer one of our profiles commented on their post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNotify {
    pub comment_host: String,
    pub comment_handle: String,
    pub post_id: Uuid,
    pub comment_id: Uuid,
}

/// Ask a peer for the comments its users left on the given posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveComments {
    pub host: String,
    pub handle: String,
    pub post_ids: Vec<Uuid>,
}

/// Author stub attached to content crossing the trust boundary.  Remote
/// hosts only ever learn a handle and display name, never key material
/// beyond what the handshake already shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub handle: String,
    pub display_name: String,
}

/// A comment as it crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentPayload {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: AuthorInfo,
    pub text: String,
    pub files: Vec<String>,
    pub created: DateTime<Utc>,
}

/// A post as it crosses the wire, comments newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPayload {
    pub id: Uuid,
    pub author: AuthorInfo,
    pub text: String,
    pub files: Vec<String>,
    pub created: DateTime<Utc>,
    pub comments: Vec<CommentPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_roundtrip() {
        let notify = PostNotify {
            post_host: "a.example".into(),
            post_handle: "alice".into(),
            post_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&notify).unwrap();
        let restored: PostNotify = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.post_id, notify.post_id);
        assert_eq!(restored.post_handle, "alice");
    }

    #[test]
    fn test_post_payload_carries_timestamps() {
        let payload = PostPayload {
            id: Uuid::new_v4(),
            author: AuthorInfo {
                handle: "alice".into(),
                display_name: "Alice".into(),
            },
            text: "hello fediverse".into(),
            files: vec![],
            created: Utc::now(),
            comments: vec![],
        };
        let value = serde_json::to_value(&payload).unwrap();
        // chrono serializes RFC 3339; peers parse it back losslessly
        assert!(value["created"].as_str().unwrap().contains('T'));
    }
}
