//! In-memory [`Datastore`] implementation.
//!
//! Backs tests and single-node development.  All maps sit behind one
//! `RwLock`; callers never hold a guard across an await point because the
//! trait is synchronous.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Comment, CommentReference, Connection, Post, PostReference, Profile};
use crate::store::Datastore;

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    connections: HashMap<Uuid, Connection>,
    posts: HashMap<Uuid, Post>,
    comments: HashMap<Uuid, Comment>,
    post_references: Vec<PostReference>,
    comment_references: Vec<CommentReference>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Datastore for MemoryStore {
    fn create_profile(&self, profile: Profile) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        if tables
            .profiles
            .values()
            .any(|p| p.handle == profile.handle)
        {
            return Err(StoreError::HandleTaken(profile.handle));
        }
        tables.profiles.insert(profile.id, profile);
        Ok(())
    }

    fn profile_by_id(&self, id: Uuid) -> Option<Profile> {
        self.tables.read().unwrap().profiles.get(&id).cloned()
    }

    fn profile_by_handle(&self, handle: &str) -> Option<Profile> {
        self.tables
            .read()
            .unwrap()
            .profiles
            .values()
            .find(|p| p.handle == handle)
            .cloned()
    }

    fn insert_connection(&self, connection: Connection) -> Result<(), StoreError> {
        self.tables
            .write()
            .unwrap()
            .connections
            .insert(connection.id, connection);
        Ok(())
    }

    fn connection_by_id(&self, profile_id: Uuid, id: Uuid) -> Option<Connection> {
        self.tables
            .read()
            .unwrap()
            .connections
            .get(&id)
            .filter(|c| c.profile_id == profile_id)
            .cloned()
    }

    fn find_connection(&self, profile_id: Uuid, host: &str, handle: &str) -> Option<Connection> {
        let tables = self.tables.read().unwrap();
        let mut matches: Vec<&Connection> = tables
            .connections
            .values()
            .filter(|c| c.profile_id == profile_id && c.host == host && c.handle == handle)
            .collect();
        matches.sort_by_key(|c| c.created);
        matches.first().map(|c| (*c).clone())
    }

    fn find_connected(&self, profile_id: Uuid, host: &str, handle: &str) -> Option<Connection> {
        let tables = self.tables.read().unwrap();
        let mut matches: Vec<&Connection> = tables
            .connections
            .values()
            .filter(|c| {
                c.profile_id == profile_id
                    && c.host == host
                    && c.handle == handle
                    && c.status == entente_shared::ConnectionStatus::Connected
            })
            .collect();
        matches.sort_by_key(|c| c.created);
        matches.first().map(|c| (*c).clone())
    }

    fn list_connections(&self, profile_id: Uuid) -> Vec<Connection> {
        let tables = self.tables.read().unwrap();
        let mut connections: Vec<Connection> = tables
            .connections
            .values()
            .filter(|c| c.profile_id == profile_id)
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.created);
        connections
    }

    fn update_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        match tables.connections.get_mut(&connection.id) {
            Some(stored) => {
                *stored = connection.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn delete_connection(&self, profile_id: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        match tables.connections.get(&id) {
            Some(c) if c.profile_id == profile_id => {
                tables.connections.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn insert_post(&self, post: Post) -> Result<(), StoreError> {
        self.tables.write().unwrap().posts.insert(post.id, post);
        Ok(())
    }

    fn post_by_id(&self, id: Uuid) -> Option<Post> {
        self.tables.read().unwrap().posts.get(&id).cloned()
    }

    fn list_posts(&self, profile_id: Uuid) -> Vec<Post> {
        let tables = self.tables.read().unwrap();
        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| p.profile_id == profile_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created.cmp(&a.created));
        posts
    }

    fn insert_comment(&self, comment: Comment) -> Result<(), StoreError> {
        self.tables
            .write()
            .unwrap()
            .comments
            .insert(comment.id, comment);
        Ok(())
    }

    fn comment_by_id(&self, id: Uuid) -> Option<Comment> {
        self.tables.read().unwrap().comments.get(&id).cloned()
    }

    fn comments_for_post(&self, post_id: Uuid) -> Vec<Comment> {
        let tables = self.tables.read().unwrap();
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created.cmp(&a.created));
        comments
    }

    fn insert_post_reference(&self, reference: PostReference) -> Result<(), StoreError> {
        self.tables.write().unwrap().post_references.push(reference);
        Ok(())
    }

    fn post_reference_for(&self, post_id: Uuid) -> Option<PostReference> {
        self.tables
            .read()
            .unwrap()
            .post_references
            .iter()
            .find(|r| r.post_id == post_id)
            .cloned()
    }

    fn update_post_reference(&self, reference: &PostReference) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        match tables
            .post_references
            .iter_mut()
            .find(|r| r.id == reference.id)
        {
            Some(stored) => {
                *stored = reference.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn count_unread_post_references(&self, connection_id: Uuid) -> usize {
        self.tables
            .read()
            .unwrap()
            .post_references
            .iter()
            .filter(|r| r.connection_id == connection_id && !r.read)
            .count()
    }

    fn insert_comment_reference(&self, reference: CommentReference) -> Result<(), StoreError> {
        self.tables
            .write()
            .unwrap()
            .comment_references
            .push(reference);
        Ok(())
    }

    fn comment_references_for_posts(&self, post_ids: &[Uuid]) -> Vec<CommentReference> {
        self.tables
            .read()
            .unwrap()
            .comment_references
            .iter()
            .filter(|r| post_ids.contains(&r.post_id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use entente_shared::ConnectionStatus;

    fn profile(handle: &str) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            handle: handle.to_string(),
            display_name: handle.to_uppercase(),
            public_key_pem: String::new(),
            private_key_pem: String::new(),
            created: Utc::now(),
        }
    }

    #[test]
    fn test_handle_is_unique() {
        let store = MemoryStore::new();
        store.create_profile(profile("alice")).unwrap();
        assert!(matches!(
            store.create_profile(profile("alice")),
            Err(StoreError::HandleTaken(_))
        ));
    }

    #[test]
    fn test_profile_lookup_by_handle() {
        let store = MemoryStore::new();
        let p = profile("bob");
        let id = p.id;
        store.create_profile(p).unwrap();
        assert_eq!(store.profile_by_handle("bob").unwrap().id, id);
        assert!(store.profile_by_handle("nobody").is_none());
    }

    #[test]
    fn test_find_connection_scoped_to_profile() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut c = Connection::new(owner, "b.example", "bob");
        c.status = ConnectionStatus::Connected;
        store.insert_connection(c.clone()).unwrap();

        assert!(store.find_connection(owner, "b.example", "bob").is_some());
        assert!(store.find_connection(other, "b.example", "bob").is_none());
        assert!(store.find_connection(owner, "c.example", "bob").is_none());
    }

    #[test]
    fn test_find_connected_ignores_untrusted_statuses() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let pending = Connection {
            status: ConnectionStatus::Pending,
            ..Connection::new(owner, "b.example", "bob")
        };
        store.insert_connection(pending).unwrap();
        assert!(store.find_connected(owner, "b.example", "bob").is_none());

        let mut connected = Connection::new(owner, "b.example", "bob");
        connected.status = ConnectionStatus::Connected;
        store.insert_connection(connected).unwrap();
        assert!(store.find_connected(owner, "b.example", "bob").is_some());
    }

    #[test]
    fn test_posts_listed_newest_first() {
        let store = MemoryStore::new();
        let author = Uuid::new_v4();
        let now = Utc::now();

        for (i, text) in ["oldest", "middle", "newest"].iter().enumerate() {
            store
                .insert_post(Post {
                    id: Uuid::new_v4(),
                    profile_id: author,
                    text: text.to_string(),
                    files: vec![],
                    created: now + Duration::seconds(i as i64),
                })
                .unwrap();
        }

        let posts = store.list_posts(author);
        let texts: Vec<&str> = posts.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn test_post_reference_read_flag_roundtrip() {
        let store = MemoryStore::new();
        let connection_id = Uuid::new_v4();
        let post_id = Uuid::new_v4();

        store
            .insert_post_reference(PostReference::new(connection_id, post_id))
            .unwrap();
        assert_eq!(store.count_unread_post_references(connection_id), 1);

        let mut reference = store.post_reference_for(post_id).unwrap();
        reference.read = true;
        store.update_post_reference(&reference).unwrap();

        assert_eq!(store.count_unread_post_references(connection_id), 0);
        // marking again is a no-op, not an error
        store.update_post_reference(&reference).unwrap();
        assert!(store.post_reference_for(post_id).unwrap().read);
    }

    #[test]
    fn test_comment_references_filtered_by_posts() {
        let store = MemoryStore::new();
        let conn = Uuid::new_v4();
        let wanted = Uuid::new_v4();
        let unwanted = Uuid::new_v4();

        store
            .insert_comment_reference(CommentReference::new(conn, wanted))
            .unwrap();
        store
            .insert_comment_reference(CommentReference::new(conn, unwanted))
            .unwrap();

        let refs = store.comment_references_for_posts(&[wanted]);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].post_id, wanted);
    }
}
