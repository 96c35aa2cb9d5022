//! The URL-signing seam.
//!
//! Stored file references are internal names; before content crosses the
//! trust boundary they are exchanged for time-limited fetchable URLs by an
//! external signing service.

pub trait UrlSigner: Send + Sync {
    fn sign_urls(&self, files: &[String]) -> Vec<String>;
}

/// Development signer that hands file references through unchanged.
pub struct PassthroughSigner;

impl UrlSigner for PassthroughSigner {
    fn sign_urls(&self, files: &[String]) -> Vec<String> {
        files.to_vec()
    }
}
