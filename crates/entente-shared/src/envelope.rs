//! The signed, hybrid-encrypted envelope exchanged between hosts.
//!
//! Sealing generates a fresh XChaCha20-Poly1305 key per message, wraps it
//! with the recipient's RSA public key (OAEP), and signs the plaintext JSON
//! bytes with the sender's RSA private key.  Opening and signature
//! verification are separate steps: decryption only proves the message was
//! meant for this recipient, the signature proves who sent it.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::{NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE};
use crate::error::CryptoError;
use crate::keys::{self, KeyPair};

/// The five cryptographic transport fields.  A response body is exactly
/// this; a request adds the clear-text sender handle (see [`Envelope`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sealed {
    /// Ciphertext, base64
    pub enc_payload: String,
    /// RSA-OAEP wrapped symmetric key, base64
    pub enc_key: String,
    /// RSA PKCS#1 v1.5 signature over the plaintext bytes, hex
    pub signature: String,
    /// XChaCha20-Poly1305 nonce, hex
    pub nonce: String,
    /// Poly1305 authentication tag, hex
    pub tag: String,
}

/// A request envelope: the sealed fields plus the sender's handle in the
/// clear.  The handle is needed to look up the addressed profile before
/// any decryption is possible; it is never trusted beyond that lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub sealed: Sealed,
    pub handle: String,
}

impl Envelope {
    pub fn new(sealed: Sealed, handle: impl Into<String>) -> Self {
        Self {
            sealed,
            handle: handle.into(),
        }
    }
}

/// Seal `payload` for the holder of `recipient_public_pem`, signed by
/// `sender`.
///
/// The payload is serialized to JSON exactly once; those bytes are both
/// encrypted and signed, so the receiver verifies the same bytes it
/// decrypted rather than a re-serialization.
pub fn seal<T: Serialize>(
    sender: &KeyPair,
    recipient_public_pem: &str,
    payload: &T,
) -> Result<Sealed, CryptoError> {
    let plaintext = serde_json::to_vec(payload).map_err(|_| CryptoError::Seal)?;

    let mut rng = rand::thread_rng();
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rng.fill_bytes(&mut key);
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let mut buffer = plaintext.clone();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| CryptoError::Seal)?;

    let enc_key = KeyPair::wrap_for(recipient_public_pem, &key)?;
    let signature = sender.sign(&plaintext)?;

    Ok(Sealed {
        enc_payload: BASE64.encode(&buffer),
        enc_key: BASE64.encode(&enc_key),
        signature: hex::encode(signature),
        nonce: hex::encode(nonce),
        tag: hex::encode(tag),
    })
}

/// Open a sealed envelope with the recipient's key pair, returning the
/// plaintext bytes.
///
/// A wrapped key that does not unwrap and an authentication tag that does
/// not verify both surface as [`CryptoError::Open`]; the caller cannot
/// distinguish tampering from a wrong key.
pub fn open(recipient: &KeyPair, sealed: &Sealed) -> Result<Vec<u8>, CryptoError> {
    let mut buffer = BASE64
        .decode(&sealed.enc_payload)
        .map_err(|_| CryptoError::MalformedField("enc_payload"))?;
    let enc_key = BASE64
        .decode(&sealed.enc_key)
        .map_err(|_| CryptoError::MalformedField("enc_key"))?;
    let nonce = hex::decode(&sealed.nonce)
        .map_err(|_| CryptoError::MalformedField("nonce"))?;
    let tag =
        hex::decode(&sealed.tag).map_err(|_| CryptoError::MalformedField("tag"))?;
    if nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
        return Err(CryptoError::Open);
    }

    let key = recipient.unwrap_key(&enc_key)?;
    if key.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::Open);
    }

    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(&nonce),
            b"",
            &mut buffer,
            Tag::from_slice(&tag),
        )
        .map_err(|_| CryptoError::Open)?;

    Ok(buffer)
}

/// Verify the envelope signature against a peer's stored public key.
///
/// `plaintext` must be the exact bytes returned by [`open`].
pub fn verify(
    signer_public_pem: &str,
    signature_hex: &str,
    plaintext: &[u8],
) -> Result<(), CryptoError> {
    let signature = hex::decode(signature_hex)
        .map_err(|_| CryptoError::MalformedField("signature"))?;
    keys::verify_signature(signer_public_pem, plaintext, &signature)
}

/// Encode the one unauthenticated bootstrap payload (connection request).
///
/// The recipient has no key for the sender yet, so this message is only
/// transport-encoded, not cryptographically protected.  It is the only
/// message type allowed to create state from an unauthenticated payload.
pub fn encode_bootstrap<T: Serialize>(payload: &T) -> Result<String, CryptoError> {
    let bytes = serde_json::to_vec(payload).map_err(|_| CryptoError::Seal)?;
    Ok(BASE64.encode(bytes))
}

/// Decode a bootstrap payload back into JSON bytes.
pub fn decode_bootstrap(enc_payload: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64
        .decode(enc_payload.trim())
        .map_err(|_| CryptoError::MalformedField("enc_payload"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair() -> KeyPair {
        KeyPair::generate().unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let alice = pair();
        let bob = pair();

        let payload = json!({
            "host": "example.org",
            "handle": "alice",
            "created": "2024-05-01T12:00:00Z",
        });
        let sealed = seal(&alice, &bob.public_key_pem().unwrap(), &payload).unwrap();

        let plaintext = open(&bob, &sealed).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(decoded, payload);

        // Bob verifies against the key Alice published.
        verify(
            &alice.public_key_pem().unwrap(),
            &sealed.signature,
            &plaintext,
        )
        .unwrap();
    }

    #[test]
    fn test_open_with_wrong_recipient_fails() {
        let alice = pair();
        let bob = pair();
        let eve = pair();

        let sealed =
            seal(&alice, &bob.public_key_pem().unwrap(), &json!({"x": 1})).unwrap();
        assert!(matches!(open(&eve, &sealed), Err(CryptoError::Open)));
    }

    #[test]
    fn test_tampered_fields_fail_to_open() {
        let alice = pair();
        let bob = pair();
        let sealed =
            seal(&alice, &bob.public_key_pem().unwrap(), &json!({"n": 42})).unwrap();

        let flip_b64 = |s: &str| {
            let mut bytes = BASE64.decode(s).unwrap();
            bytes[0] ^= 0x01;
            BASE64.encode(bytes)
        };
        let flip_hex = |s: &str| {
            let mut bytes = hex::decode(s).unwrap();
            bytes[0] ^= 0x01;
            hex::encode(bytes)
        };

        let mut tampered = sealed.clone();
        tampered.enc_payload = flip_b64(&sealed.enc_payload);
        assert!(open(&bob, &tampered).is_err());

        let mut tampered = sealed.clone();
        tampered.enc_key = flip_b64(&sealed.enc_key);
        assert!(open(&bob, &tampered).is_err());

        let mut tampered = sealed.clone();
        tampered.nonce = flip_hex(&sealed.nonce);
        assert!(open(&bob, &tampered).is_err());

        let mut tampered = sealed.clone();
        tampered.tag = flip_hex(&sealed.tag);
        assert!(open(&bob, &tampered).is_err());
    }

    #[test]
    fn test_tampered_plaintext_fails_verify() {
        let alice = pair();
        let bob = pair();
        let sealed =
            seal(&alice, &bob.public_key_pem().unwrap(), &json!({"n": 42})).unwrap();

        let mut plaintext = open(&bob, &sealed).unwrap();
        plaintext[0] ^= 0x01;
        assert!(verify(
            &alice.public_key_pem().unwrap(),
            &sealed.signature,
            &plaintext
        )
        .is_err());
    }

    #[test]
    fn test_signature_from_wrong_sender_fails_verify() {
        let alice = pair();
        let bob = pair();
        let mallory = pair();

        let sealed =
            seal(&mallory, &bob.public_key_pem().unwrap(), &json!({"n": 1})).unwrap();
        let plaintext = open(&bob, &sealed).unwrap();

        // Decryption succeeded but the signature was not made by Alice.
        assert!(matches!(
            verify(
                &alice.public_key_pem().unwrap(),
                &sealed.signature,
                &plaintext
            ),
            Err(CryptoError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_bootstrap_roundtrip() {
        let payload = json!({"requestor_handle": "alice", "requestor_host": "a.example"});
        let encoded = encode_bootstrap(&payload).unwrap();
        let bytes = decode_bootstrap(&encoded).unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_bootstrap_rejects_bad_base64() {
        assert!(decode_bootstrap("not//valid==base64!!").is_err());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let alice = pair();
        let bob = pair();
        let sealed =
            seal(&alice, &bob.public_key_pem().unwrap(), &json!({"n": 9})).unwrap();
        let envelope = Envelope::new(sealed, "alice");

        let wire = serde_json::to_value(&envelope).unwrap();
        for field in ["enc_payload", "enc_key", "signature", "nonce", "tag", "handle"] {
            assert!(wire.get(field).is_some(), "missing wire field {field}");
        }
    }
}
