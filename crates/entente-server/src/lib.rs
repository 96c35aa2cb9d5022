//! # entente-server
//!
//! Federated social host.  Each instance is authoritative for its own
//! users and exchanges posts, comments and read-notifications with peer
//! instances over signed, hybrid-encrypted envelopes -- no shared
//! database, no shared secret.
//!
//! The HTTP surface splits three ways:
//! - **`/api/*`** -- federation endpoints consumed by peer hosts
//! - **`/worker/*`** -- queue-worker endpoints consumed by the task
//!   dispatcher, one outbound call each
//! - **`/local/*`** -- the thin surface a frontend drives

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod federation;
pub mod local;
pub mod signer;
pub mod validate;
pub mod workers;

pub use api::{build_router, serve, AppState};
pub use config::ServerConfig;
