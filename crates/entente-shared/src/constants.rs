/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// XChaCha20-Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// RSA modulus size in bits for profile key pairs
pub const RSA_KEY_BITS: usize = 2048;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Comment text substituted when a peer cannot be reached during
/// retrieval fan-out
pub const COMMENT_FETCH_FAILED: &str = "error retrieving comments";
