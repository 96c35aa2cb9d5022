//! The datastore boundary.
//!
//! The engine treats persistence as a key-value store with query-by-field
//! semantics: get one record by field equality, list records under a
//! parent scope in a defined order.  Anything fancier (indexes, joins,
//! storage engines) lives behind this trait and is out of scope here.

use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Comment, CommentReference, Connection, Post, PostReference, Profile};

pub trait Datastore: Send + Sync {
    // -- profiles ----------------------------------------------------------

    /// Fails with [`StoreError::HandleTaken`] if the handle is in use;
    /// handles are the federation-wide stable address of a profile.
    fn create_profile(&self, profile: Profile) -> Result<(), StoreError>;
    fn profile_by_id(&self, id: Uuid) -> Option<Profile>;
    fn profile_by_handle(&self, handle: &str) -> Option<Profile>;

    // -- connections -------------------------------------------------------

    fn insert_connection(&self, connection: Connection) -> Result<(), StoreError>;
    fn connection_by_id(&self, profile_id: Uuid, id: Uuid) -> Option<Connection>;
    /// First connection under `profile_id` matching host and handle,
    /// regardless of status.
    fn find_connection(&self, profile_id: Uuid, host: &str, handle: &str) -> Option<Connection>;
    /// Like [`Datastore::find_connection`] but only a `Connected` record;
    /// the lookup used before trusting a peer signature.
    fn find_connected(&self, profile_id: Uuid, host: &str, handle: &str) -> Option<Connection>;
    /// All connections owned by a profile, oldest first.
    fn list_connections(&self, profile_id: Uuid) -> Vec<Connection>;
    /// Replace the stored record with the same id.
    fn update_connection(&self, connection: &Connection) -> Result<(), StoreError>;
    fn delete_connection(&self, profile_id: Uuid, id: Uuid) -> Result<(), StoreError>;

    // -- posts and comments ------------------------------------------------

    fn insert_post(&self, post: Post) -> Result<(), StoreError>;
    fn post_by_id(&self, id: Uuid) -> Option<Post>;
    /// A profile's posts, newest first.
    fn list_posts(&self, profile_id: Uuid) -> Vec<Post>;

    fn insert_comment(&self, comment: Comment) -> Result<(), StoreError>;
    fn comment_by_id(&self, id: Uuid) -> Option<Comment>;
    /// Local comments on one post, newest first.
    fn comments_for_post(&self, post_id: Uuid) -> Vec<Comment>;

    // -- notification references -------------------------------------------

    fn insert_post_reference(&self, reference: PostReference) -> Result<(), StoreError>;
    fn post_reference_for(&self, post_id: Uuid) -> Option<PostReference>;
    fn update_post_reference(&self, reference: &PostReference) -> Result<(), StoreError>;
    /// Unread post notifications received over one connection.
    fn count_unread_post_references(&self, connection_id: Uuid) -> usize;

    fn insert_comment_reference(&self, reference: CommentReference) -> Result<(), StoreError>;
    /// All comment receipts touching any of the given posts.
    fn comment_references_for_posts(&self, post_ids: &[Uuid]) -> Vec<CommentReference>;
}
