//! # entente-store
//!
//! Domain models and the datastore boundary for an Entente host.
//!
//! Persistence itself is an external collaborator: the [`Datastore`] trait
//! captures exactly what the federation engine needs from it -- get by
//! field equality and ordered listing under a parent scope.  The bundled
//! [`MemoryStore`] backs tests and single-node development.

pub mod memory;
pub mod models;
pub mod store;

mod error;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use models::*;
pub use store::Datastore;
