//! Outbound fan-out engine.
//!
//! Two jobs, both scatter-gather with per-peer failure isolation:
//! retrieval fan-out pulls remote comments from every peer that has
//! commented on a profile's posts, and notification sends tell one peer
//! about new local content.  A peer that is down, slow, or returns garbage
//! costs exactly its own slice of the result, never the whole operation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use entente_shared::constants::COMMENT_FETCH_FAILED;
use entente_shared::protocol::{AuthorInfo, CommentPayload, RetrieveComments};
use entente_shared::{envelope, CryptoError, Envelope, KeyPair, Sealed};
use entente_store::{Connection, Datastore, Profile};

use crate::api::AppState;
use crate::config::scheme_for;

/// Why one peer call failed.  Only ever logged and converted into a
/// placeholder; never propagated as a whole-request failure.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("peer returned status {0}")]
    Status(u16),

    #[error("peer response could not be opened")]
    Envelope(#[from] CryptoError),

    #[error("peer response could not be decoded")]
    Decode,
}

/// Per-post comment lists fed concurrently by peer-result handlers.
///
/// Insertion keeps each post's list sorted newest-first; the interleaving
/// of different peers' results is whatever order their responses land in.
#[derive(Clone, Default)]
pub struct CommentCollector {
    inner: Arc<Mutex<HashMap<Uuid, Vec<CommentPayload>>>>,
}

impl CommentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, comment: CommentPayload) {
        let mut map = self.inner.lock().unwrap();
        let list = map.entry(comment.post_id).or_default();
        let at = list.partition_point(|c| c.created >= comment.created);
        list.insert(at, comment);
    }

    /// Drain the collected comments.  Call only after every peer task has
    /// settled.
    pub fn take(&self) -> HashMap<Uuid, Vec<CommentPayload>> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }
}

/// Build a placeholder comment standing in for a peer that could not be
/// reached, attributed to that peer so the failure stays visible.
fn placeholder_comment(connection: &Connection, post_id: Uuid) -> CommentPayload {
    CommentPayload {
        id: Uuid::new_v4(),
        post_id,
        author: AuthorInfo {
            handle: connection.handle.clone(),
            display_name: connection
                .display_name
                .clone()
                .unwrap_or_else(|| connection.handle.clone()),
        },
        text: COMMENT_FETCH_FAILED.to_string(),
        files: vec![],
        created: Utc::now(),
    }
}

/// Retrieval fan-out: collect remote comments for `post_ids` belonging to
/// `connectee`.
///
/// Each peer that has comment references against these posts is contacted
/// exactly once, all peers concurrently; the call returns only after every
/// peer task settles.  Failed peers contribute one placeholder per
/// affected post instead of comments.  If the caller's future is dropped,
/// the `JoinSet` aborts any in-flight peer call and no partial result is
/// applied.
pub async fn gather_remote_comments(
    state: &AppState,
    connectee: &Profile,
    keys: &KeyPair,
    post_ids: &[Uuid],
) -> HashMap<Uuid, Vec<CommentPayload>> {
    let references = state.store.comment_references_for_posts(post_ids);

    // one entry per commenting peer, with every post it touched
    let mut by_connection: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for reference in &references {
        by_connection
            .entry(reference.connection_id)
            .or_default()
            .insert(reference.post_id);
    }

    let collector = CommentCollector::new();
    let mut tasks = JoinSet::new();

    for (connection_id, posts) in by_connection {
        let Some(connection) = state.store.connection_by_id(connectee.id, connection_id) else {
            // a reference should always resolve to its connection; flag,
            // don't guess
            warn!(%connection_id, "comment reference points at missing connection");
            continue;
        };

        let state = state.clone();
        let collector = collector.clone();
        let keys = keys.clone();
        let handle = connectee.handle.clone();
        let wanted: Vec<Uuid> = posts.iter().copied().collect();

        tasks.spawn(async move {
            match fetch_peer_comments(&state, &keys, &handle, &connection, &wanted).await {
                Ok(comments) => {
                    debug!(
                        peer = %connection.host,
                        count = comments.len(),
                        "retrieved remote comments"
                    );
                    for comment in comments {
                        if wanted.contains(&comment.post_id) {
                            collector.insert(comment);
                        } else {
                            warn!(
                                peer = %connection.host,
                                post_id = %comment.post_id,
                                "peer returned comment for unrequested post"
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        peer = %connection.host,
                        peer_handle = %connection.handle,
                        error = %err,
                        "unable to retrieve comments"
                    );
                    for post_id in wanted {
                        collector.insert(placeholder_comment(&connection, post_id));
                    }
                }
            }
        });
    }

    // scatter-gather: the response waits for every peer, success or not
    while tasks.join_next().await.is_some() {}

    collector.take()
}

/// One outbound retrieve-comments call to one peer.
async fn fetch_peer_comments(
    state: &AppState,
    keys: &KeyPair,
    connectee_handle: &str,
    connection: &Connection,
    post_ids: &[Uuid],
) -> Result<Vec<CommentPayload>, PeerError> {
    let payload = RetrieveComments {
        host: state.config.public_host.clone(),
        handle: connectee_handle.to_string(),
        post_ids: post_ids.to_vec(),
    };

    let response = post_envelope(state, keys, connection, "/api/retrieve-comments", &payload)
        .await?;

    let sealed: Sealed = response.json().await.map_err(|_| PeerError::Decode)?;
    let plaintext = envelope::open(keys, &sealed)?;
    serde_json::from_slice(&plaintext).map_err(|_| PeerError::Decode)
}

/// Seal `payload` for `connection`'s peer and POST it to `path` on that
/// peer's host.  Returns the response if the peer answered 200.
pub async fn post_envelope<T: Serialize>(
    state: &AppState,
    keys: &KeyPair,
    connection: &Connection,
    path: &str,
    payload: &T,
) -> Result<reqwest::Response, PeerError> {
    let public_key = connection
        .public_key_pem
        .as_deref()
        .ok_or(PeerError::Envelope(CryptoError::Seal))?;

    let sealed = envelope::seal(keys, public_key, payload)?;
    let body = Envelope::new(sealed, connection.handle.clone());

    let url = format!(
        "{}://{}{}",
        scheme_for(&connection.host),
        connection.host,
        path
    );
    let response = state.http.post(url).json(&body).send().await?;

    if !response.status().is_success() {
        return Err(PeerError::Status(response.status().as_u16()));
    }
    Ok(response)
}

/// Notification send: tell one connected peer about new local content.
/// Stateless per call; the caller (a queue worker) reports failure to the
/// dispatcher, which owns any retry policy.
pub async fn notify_peer<T: Serialize>(
    state: &AppState,
    keys: &KeyPair,
    connection: &Connection,
    path: &str,
    payload: &T,
) -> Result<(), PeerError> {
    post_envelope(state, keys, connection, path, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn comment(post_id: Uuid, handle: &str, offset_secs: i64) -> CommentPayload {
        CommentPayload {
            id: Uuid::new_v4(),
            post_id,
            author: AuthorInfo {
                handle: handle.to_string(),
                display_name: handle.to_string(),
            },
            text: format!("from {handle}"),
            files: vec![],
            created: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_collector_sorts_newest_first_within_post() {
        let collector = CommentCollector::new();
        let post = Uuid::new_v4();

        collector.insert(comment(post, "carol", 10));
        collector.insert(comment(post, "alice", 30));
        collector.insert(comment(post, "bob", 20));

        let map = collector.take();
        let handles: Vec<&str> = map[&post]
            .iter()
            .map(|c| c.author.handle.as_str())
            .collect();
        assert_eq!(handles, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_collector_keeps_posts_separate() {
        let collector = CommentCollector::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        collector.insert(comment(first, "alice", 0));
        collector.insert(comment(second, "bob", 0));

        let map = collector.take();
        assert_eq!(map[&first].len(), 1);
        assert_eq!(map[&second].len(), 1);
    }

    #[test]
    fn test_placeholder_attribution() {
        let mut connection = Connection::new(Uuid::new_v4(), "b.example", "bob");
        connection.display_name = Some("Bob".to_string());
        let post_id = Uuid::new_v4();

        let placeholder = placeholder_comment(&connection, post_id);
        assert_eq!(placeholder.post_id, post_id);
        assert_eq!(placeholder.author.handle, "bob");
        assert_eq!(placeholder.author.display_name, "Bob");
        assert_eq!(placeholder.text, COMMENT_FETCH_FAILED);
    }
}
