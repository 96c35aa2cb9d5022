//! # entente-shared
//!
//! Wire protocol and cryptography shared by every Entente host.
//!
//! Two federated hosts share no secret; each side holds only its own users'
//! RSA key pairs and the public keys peers have presented.  This crate
//! provides the hybrid-encrypted, signed [`envelope`] exchanged between
//! hosts, the [`types::ConnectionStatus`] lifecycle, and the typed
//! [`protocol`] payloads carried inside envelopes.

pub mod constants;
pub mod envelope;
pub mod keys;
pub mod protocol;
pub mod types;

mod error;

pub use envelope::{Envelope, Sealed};
pub use error::{CryptoError, KeyError};
pub use keys::KeyPair;
pub use types::ConnectionStatus;
