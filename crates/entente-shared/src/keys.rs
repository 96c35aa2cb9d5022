use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::sha2::{Digest, Sha256};
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

use crate::constants::RSA_KEY_BITS;
use crate::error::{CryptoError, KeyError};

/// A profile's long-lived RSA key pair.
///
/// The public half is handed to peers during the connection handshake; the
/// private half never leaves the host.  Keys are generated once at profile
/// creation and never rotated.
#[derive(Clone, Debug)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh RSA-2048 key pair.
    pub fn generate() -> Result<Self, KeyError> {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(|_| KeyError::GenerationFailed)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Restore a key pair from a PKCS#8 PEM private key.
    pub fn from_private_pem(pem: &str) -> Result<Self, KeyError> {
        let private_key =
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|_| KeyError::InvalidPem)?;
        let public_key = RsaPublicKey::from(&private_key);
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// PKCS#8 PEM encoding of the private key.  Persist-only: this string
    /// must never appear in an outbound payload or a log line.
    pub fn private_key_pem(&self) -> Result<String, KeyError> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|_| KeyError::InvalidPem)
    }

    /// SPKI PEM encoding of the public key, as shared with peers.
    pub fn public_key_pem(&self) -> Result<String, KeyError> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|_| KeyError::InvalidPem)
    }

    /// Wrap a symmetric key for a recipient with RSA-OAEP(SHA-256).
    pub fn wrap_for(recipient_public_pem: &str, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let recipient = decode_public_pem(recipient_public_pem)?;
        let mut rng = rand::thread_rng();
        recipient
            .encrypt(&mut rng, Oaep::new::<Sha256>(), key)
            .map_err(|_| CryptoError::Seal)
    }

    /// Unwrap a symmetric key with this pair's private key.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::Open)
    }

    /// Sign `message` with RSA PKCS#1 v1.5 over its SHA-256 digest.
    /// Hash-then-sign, deterministic for a given key and message.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let digest = Sha256::digest(message);
        self.private_key
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest.as_slice())
            .map_err(|_| CryptoError::Seal)
    }
}

/// Verify an RSA PKCS#1 v1.5 signature against a PEM public key.
pub fn verify_signature(
    signer_public_pem: &str,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = decode_public_pem(signer_public_pem)?;
    let digest = Sha256::digest(message);
    key.verify(Pkcs1v15Sign::new::<Sha256>(), digest.as_slice(), signature)
        .map_err(|_| CryptoError::SignatureMismatch)
}

fn decode_public_pem(pem: &str) -> Result<RsaPublicKey, KeyError> {
    RsaPublicKey::from_public_key_pem(pem).map_err(|_| KeyError::InvalidPem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let pem = pair.private_key_pem().unwrap();
        let restored = KeyPair::from_private_pem(&pem).unwrap();
        assert_eq!(
            pair.public_key_pem().unwrap(),
            restored.public_key_pem().unwrap()
        );
    }

    #[test]
    fn test_sign_verify() {
        let pair = KeyPair::generate().unwrap();
        let message = b"federated greetings";
        let signature = pair.sign(message).unwrap();

        let pem = pair.public_key_pem().unwrap();
        assert!(verify_signature(&pem, message, &signature).is_ok());
        assert!(verify_signature(&pem, b"altered", &signature).is_err());
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let pair = KeyPair::generate().unwrap();
        let pem = pair.public_key_pem().unwrap();
        let key = [0x42u8; 32];

        let wrapped = KeyPair::wrap_for(&pem, &key).unwrap();
        let unwrapped = pair.unwrap_key(&wrapped).unwrap();
        assert_eq!(unwrapped, key);
    }

    #[test]
    fn test_unwrap_with_wrong_key_fails() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let wrapped =
            KeyPair::wrap_for(&alice.public_key_pem().unwrap(), &[7u8; 32]).unwrap();
        assert!(bob.unwrap_key(&wrapped).is_err());
    }
}
