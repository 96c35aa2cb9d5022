//! Inbound request validation pipeline.
//!
//! Every federation handler runs the same ordered checks, short-circuiting
//! on the first failure: transport fields present -> sender handle resolves
//! to a local profile -> envelope opens -> payload fields present -> (for
//! everything but the bootstrap request) a connected peer record exists and
//! its stored key verifies the signature.  Each step is a plain function so
//! the chain stays auditable and testable in isolation.

use serde_json::Value;

use entente_shared::{envelope, Envelope, KeyPair};
use entente_store::{Connection, Datastore, Profile};

use crate::error::ApiError;

/// Everything the pipeline has established about a request after the
/// decrypt step: the addressed profile, the raw envelope, the exact
/// plaintext bytes and their parsed JSON form.
#[derive(Debug)]
pub struct EnvelopedRequest {
    pub connectee: Profile,
    pub keys: KeyPair,
    pub envelope: Envelope,
    pub plaintext: Vec<u8>,
    pub payload: Value,
}

/// Step 1: required fields exist in a JSON object.
pub fn require_fields(data: &Value, fields: &[&str]) -> Result<(), ApiError> {
    if fields.iter().all(|f| data.get(f).is_some()) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "missing required fields".to_string(),
        ))
    }
}

/// Step 2: the clear-text sender handle must address a local profile.
/// The handle is only trusted as a lookup key, nothing more.
pub fn resolve_handle(store: &dyn Datastore, handle: &str) -> Result<Profile, ApiError> {
    store
        .profile_by_handle(handle)
        .ok_or_else(|| ApiError::NotFound("No such handle".to_string()))
}

/// Steps 1-4 for enveloped operations: transport fields, handle
/// resolution, decrypt, payload fields.
pub fn validate_enveloped(
    store: &dyn Datastore,
    body: &Value,
    payload_fields: &[&str],
) -> Result<EnvelopedRequest, ApiError> {
    require_fields(
        body,
        &["enc_payload", "enc_key", "signature", "handle", "nonce", "tag"],
    )?;

    let env: Envelope = serde_json::from_value(body.clone())
        .map_err(|_| ApiError::Validation("malformed envelope".to_string()))?;

    let connectee = resolve_handle(store, &env.handle)?;
    let keys = KeyPair::from_private_pem(&connectee.private_key_pem)
        .map_err(|_| ApiError::Internal("profile key unavailable".to_string()))?;

    let plaintext = envelope::open(&keys, &env.sealed)?;
    let payload: Value = serde_json::from_slice(&plaintext)
        .map_err(|_| ApiError::Validation("unable to convert payload to JSON".to_string()))?;

    require_fields(&payload, payload_fields)?;

    Ok(EnvelopedRequest {
        connectee,
        keys,
        envelope: env,
        plaintext,
        payload,
    })
}

/// Step 5: the claimed peer must hold a `Connected` record under the
/// addressed profile, and the signature must verify against the key stored
/// in that record.  Decryption only proved the message was for us; this
/// step proves who sent it.
pub fn require_connected(
    store: &dyn Datastore,
    request: &EnvelopedRequest,
    host_key: &str,
    handle_key: &str,
) -> Result<Connection, ApiError> {
    let host = request.payload[host_key]
        .as_str()
        .ok_or_else(|| ApiError::Validation("missing required fields".to_string()))?;
    let handle = request.payload[handle_key]
        .as_str()
        .ok_or_else(|| ApiError::Validation("missing required fields".to_string()))?;

    let connection = store
        .find_connected(request.connectee.id, host, handle)
        .ok_or_else(|| ApiError::NotFound("No connection found".to_string()))?;

    let public_key = connection
        .public_key_pem
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("No connection found".to_string()))?;

    envelope::verify(public_key, &request.envelope.sealed.signature, &request.plaintext)
        .map_err(|_| ApiError::Validation("signature does not match".to_string()))?;

    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use entente_shared::protocol::PostNotify;
    use entente_shared::ConnectionStatus;
    use entente_store::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn profile_with_keys(store: &MemoryStore, handle: &str) -> (Profile, KeyPair) {
        let keys = KeyPair::generate().unwrap();
        let profile = Profile {
            id: Uuid::new_v4(),
            handle: handle.to_string(),
            display_name: handle.to_string(),
            public_key_pem: keys.public_key_pem().unwrap(),
            private_key_pem: keys.private_key_pem().unwrap(),
            created: Utc::now(),
        };
        store.create_profile(profile.clone()).unwrap();
        (profile, keys)
    }

    fn enveloped_body(sender: &KeyPair, recipient_pem: &str, handle: &str, payload: &Value) -> Value {
        let sealed = envelope::seal(sender, recipient_pem, payload).unwrap();
        serde_json::to_value(Envelope::new(sealed, handle)).unwrap()
    }

    #[test]
    fn test_missing_transport_fields_rejected() {
        let body = json!({"enc_payload": "x", "handle": "bob"});
        let err = require_fields(
            &body,
            &["enc_payload", "enc_key", "signature", "handle", "nonce", "tag"],
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_unknown_handle_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            resolve_handle(&store, "ghost"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_pipeline_opens_and_checks_payload_fields() {
        let store = MemoryStore::new();
        let (_bob, bob_keys) = profile_with_keys(&store, "bob");
        let alice_keys = KeyPair::generate().unwrap();

        let payload = json!({"host": "a.example", "handle": "alice"});
        let body = enveloped_body(
            &alice_keys,
            &bob_keys.public_key_pem().unwrap(),
            "bob",
            &payload,
        );

        let request = validate_enveloped(&store, &body, &["host", "handle"]).unwrap();
        assert_eq!(request.connectee.handle, "bob");
        assert_eq!(request.payload["handle"], "alice");

        // same envelope, stricter field list
        let err = validate_enveloped(&store, &body, &["host", "handle", "post_ids"]).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_forged_sender_fails_connection_check() {
        let store = MemoryStore::new();
        let (bob, bob_keys) = profile_with_keys(&store, "bob");
        let alice_keys = KeyPair::generate().unwrap();
        let mallory_keys = KeyPair::generate().unwrap();

        // bob's record of alice, holding alice's real key
        let mut connection = Connection::new(bob.id, "a.example", "alice");
        connection.status = ConnectionStatus::Connected;
        connection.public_key_pem = Some(alice_keys.public_key_pem().unwrap());
        store.insert_connection(connection).unwrap();

        let notify = PostNotify {
            post_host: "a.example".to_string(),
            post_handle: "alice".to_string(),
            post_id: Uuid::new_v4(),
        };
        let payload = serde_json::to_value(&notify).unwrap();

        // mallory seals (and signs) while claiming to be alice
        let body = enveloped_body(
            &mallory_keys,
            &bob_keys.public_key_pem().unwrap(),
            "bob",
            &payload,
        );
        let request = validate_enveloped(
            &store,
            &body,
            &["post_host", "post_handle", "post_id"],
        )
        .unwrap();

        let err = require_connected(&store, &request, "post_host", "post_handle").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_unknown_connection_is_not_found() {
        let store = MemoryStore::new();
        let (_bob, bob_keys) = profile_with_keys(&store, "bob");
        let alice_keys = KeyPair::generate().unwrap();

        let payload = json!({"host": "a.example", "handle": "alice"});
        let body = enveloped_body(
            &alice_keys,
            &bob_keys.public_key_pem().unwrap(),
            "bob",
            &payload,
        );
        let request = validate_enveloped(&store, &body, &["host", "handle"]).unwrap();

        let err = require_connected(&store, &request, "host", "handle").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
