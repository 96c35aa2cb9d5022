use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Sealing failed")]
    Seal,

    /// Key unwrap and tag verification failures are deliberately collapsed
    /// into this one variant so a caller cannot tell which step rejected
    /// the envelope.
    #[error("Unable to open envelope")]
    Open,

    #[error("Signature does not match")]
    SignatureMismatch,

    #[error("Malformed envelope field: {0}")]
    MalformedField(&'static str),

    #[error("Payload is not valid JSON")]
    MalformedPayload,

    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Failed to generate key pair")]
    GenerationFailed,

    #[error("Invalid PEM key material")]
    InvalidPem,
}
