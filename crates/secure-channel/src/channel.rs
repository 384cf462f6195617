//! The ordered receive-validation pipeline, send path, and websocket
//! admission for a paired device. Decoupled from the engine's
//! `StorageBackend` per spec §2 ("C5 is orthogonal"): this crate only
//! needs device-key lookup/persistence, so it defines its own narrower
//! [`DeviceKeyStore`] rather than depending on `n3n-execution`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use n3n_core::DeviceId;
use n3n_error::{Error, ErrorKind, Result};
use rand::RngCore;

use crate::crypto::{open, seal};
use crate::device_key::DeviceKey;
use crate::envelope::{Direction, Envelope, Header, CURRENT_VERSION};
use crate::registration::verify_device_token;

/// Messages older or newer than this, relative to the receiver's clock,
/// are rejected regardless of sequence number (spec §4.5 step 3).
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::minutes(5);

/// Persistence seam for device keys, kept narrow so this crate has no
/// dependency on execution- or flow-related storage concerns.
#[async_trait]
pub trait DeviceKeyStore: Send + Sync {
    async fn find(&self, device_id: DeviceId) -> Result<Option<DeviceKey>>;
    async fn store(&self, device_key: &DeviceKey) -> Result<()>;
}

/// Decode and verify an inbound envelope against the six-step pipeline:
/// version check, device-key lookup and revocation check, clock-skew
/// check, replay check, AEAD open, then advance `last_sequence`.
///
/// Returns the decrypted plaintext. `device_key` is updated in place
/// (`last_sequence`/`last_active_at`) on success; the caller persists it.
pub fn receive(wire: &str, device_key: &mut DeviceKey, now: DateTime<Utc>) -> Result<Vec<u8>> {
    let envelope = Envelope::decode(wire)?;

    // 1. Version check.
    if envelope.header.v != CURRENT_VERSION {
        return Err(Error::new(ErrorKind::UnsupportedVersion, format!("unsupported envelope version {}", envelope.header.v)));
    }

    // 2. Device key exists (caller already resolved it) and is not revoked.
    if !device_key.is_usable() {
        return Err(Error::new(ErrorKind::Revoked, "device key has been revoked"));
    }
    if envelope.header.did != device_key.device_id {
        return Err(Error::new(ErrorKind::UnknownDevice, "envelope device id does not match the resolved key"));
    }

    // 3. Clock skew.
    let skew = (now - envelope.header.ts).abs();
    if skew > CLOCK_SKEW_TOLERANCE {
        return Err(Error::new(ErrorKind::Expired, "envelope timestamp outside the acceptance window"));
    }

    // 4. Replay defense: sequence must strictly increase.
    if envelope.header.seq <= device_key.last_sequence {
        return Err(Error::new(ErrorKind::Replay, "envelope sequence number already seen"));
    }

    // 5. AEAD open, keyed by direction (c2s decrypted with encKeyC2S).
    if envelope.header.dir != Direction::C2s {
        return Err(Error::new(ErrorKind::Validation, "expected a client-to-server envelope"));
    }
    let nonce = envelope.header.nonce_bytes()?;
    let aad = envelope.header.canonical_bytes()?;
    let plaintext = open(&device_key.enc_key_c2s, &nonce, &aad, &envelope.combined())?;

    // 6. Only advance state once the message has fully verified.
    device_key.last_sequence = envelope.header.seq;
    device_key.last_active_at = now;

    Ok(plaintext)
}

/// Seal an outbound (server-to-client) message, claiming the next
/// outbound sequence number from `device_key`.
pub fn send(device_key: &mut DeviceKey, plaintext: &[u8], now: DateTime<Utc>) -> Result<String> {
    if !device_key.is_usable() {
        return Err(Error::new(ErrorKind::Revoked, "device key has been revoked"));
    }

    let seq = device_key.next_outbound_sequence();
    let mut nonce = [0u8; 12];
    rand::rng().fill_bytes(&mut nonce);
    let header = Header::new(device_key.device_id, now, seq, nonce, Direction::S2c);
    let aad = header.canonical_bytes()?;
    let combined = seal(&device_key.enc_key_s2c, &nonce, &aad, plaintext)?;
    let envelope = Envelope::from_combined(header, &combined)?;
    envelope.encode()
}

/// Where a `deviceToken` may be presented on a websocket upgrade request.
pub enum TokenLocation<'a> {
    QueryParam(&'a str),
    Header(&'a str),
    Subprotocol(&'a str),
}

/// Extract the `deviceToken` from whichever transport location carried it,
/// in the precedence order query param, header, subprotocol.
#[must_use]
pub fn extract_device_token<'a>(
    query: Option<&'a str>,
    header: Option<&'a str>,
    subprotocol: Option<&'a str>,
) -> Option<TokenLocation<'a>> {
    if let Some(q) = query {
        return Some(TokenLocation::QueryParam(q));
    }
    if let Some(h) = header {
        return Some(TokenLocation::Header(h));
    }
    subprotocol.map(TokenLocation::Subprotocol)
}

/// Resolve a websocket upgrade's `deviceToken` to a paired, unrevoked
/// device. This is the sole admission check for the Secure Device Channel:
/// a connection with no valid token, or whose token names a revoked or
/// unknown device, must be rejected before any envelope is accepted.
pub async fn admit(store: &dyn DeviceKeyStore, token: &str) -> Result<DeviceKey> {
    // The token embeds the claimed device id so we can look up the key
    // needed to verify its own MAC, without a separate lookup table.
    let claimed = extract_claimed_device_id(token)?;
    let device_key = store
        .find(claimed)
        .await?
        .ok_or_else(|| Error::new(ErrorKind::UnknownDevice, "no device key for the claimed device id"))?;

    if !device_key.is_usable() {
        return Err(Error::new(ErrorKind::Revoked, "device key has been revoked"));
    }

    verify_device_token(token, &device_key)?;
    Ok(device_key)
}

fn extract_claimed_device_id(token: &str) -> Result<DeviceId> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let payload = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid device token encoding", e))?;
    if payload.len() != 16 + 32 {
        return Err(Error::validation("device token has the wrong length"));
    }
    let bytes: [u8; 16] = payload[..16].try_into().expect("checked length above");
    Ok(DeviceId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_keys, EphemeralKeypair};
    use crate::registration::issue_device_token;
    use n3n_core::UserId;
    use std::collections::HashMap;
    use tokio::sync::Mutex as AsyncMutex;

    fn paired_keys() -> (DeviceKey, DeviceKey) {
        let server = EphemeralKeypair::generate();
        let client = EphemeralKeypair::generate();
        let server_public = server.public;
        let client_public = client.public;
        let server_shared = server.diffie_hellman(&client_public);
        let client_shared = client.diffie_hellman(&server_public);
        assert_eq!(server_shared, client_shared);

        let device_id = DeviceId::v4();
        let user_id = UserId::v4();
        let keys = derive_keys(&server_shared, device_id.as_bytes(), user_id.as_bytes());
        let now = Utc::now();
        let server_key = DeviceKey::new(device_id, user_id, "d".into(), "ios".into(), "fp".into(), keys.enc_key_c2s, keys.enc_key_s2c, keys.auth_key, now);
        let client_key = server_key.clone();
        (server_key, client_key)
    }

    #[test]
    fn send_then_receive_roundtrips() {
        let (mut server_key, _client_key) = paired_keys();
        let now = Utc::now();

        // Simulate the client sealing a c2s envelope directly (mirrors
        // `send` but with swapped direction/key, since the agent side is
        // out of scope for this crate).
        let seq = 1;
        let mut nonce = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce);
        let header = Header::new(server_key.device_id, now, seq, nonce, Direction::C2s);
        let aad = header.canonical_bytes().unwrap();
        let combined = seal(&server_key.enc_key_c2s, &nonce, &aad, b"ping").unwrap();
        let envelope = Envelope::from_combined(header, &combined).unwrap();
        let wire = envelope.encode().unwrap();

        let plaintext = receive(&wire, &mut server_key, now).unwrap();
        assert_eq!(plaintext, b"ping");
        assert_eq!(server_key.last_sequence, 1);
    }

    #[test]
    fn receive_rejects_replayed_sequence() {
        let (mut server_key, _client_key) = paired_keys();
        let now = Utc::now();
        server_key.last_sequence = 5;

        let header = Header::new(server_key.device_id, now, 5, [1u8; 12], Direction::C2s);
        let aad = header.canonical_bytes().unwrap();
        let combined = seal(&server_key.enc_key_c2s, &[1u8; 12], &aad, b"x").unwrap();
        let envelope = Envelope::from_combined(header, &combined).unwrap();
        let wire = envelope.encode().unwrap();

        let err = receive(&wire, &mut server_key, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Replay);
    }

    #[test]
    fn receive_rejects_stale_timestamp() {
        let (mut server_key, _client_key) = paired_keys();
        let now = Utc::now();
        let stale = now - Duration::minutes(10);

        let header = Header::new(server_key.device_id, stale, 1, [1u8; 12], Direction::C2s);
        let aad = header.canonical_bytes().unwrap();
        let combined = seal(&server_key.enc_key_c2s, &[1u8; 12], &aad, b"x").unwrap();
        let envelope = Envelope::from_combined(header, &combined).unwrap();
        let wire = envelope.encode().unwrap();

        let err = receive(&wire, &mut server_key, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Expired);
    }

    #[test]
    fn receive_rejects_revoked_device() {
        let (mut server_key, _client_key) = paired_keys();
        server_key.revoke();
        let now = Utc::now();

        let header = Header::new(server_key.device_id, now, 1, [1u8; 12], Direction::C2s);
        let aad = header.canonical_bytes().unwrap();
        let combined = seal(&server_key.enc_key_c2s, &[1u8; 12], &aad, b"x").unwrap();
        let envelope = Envelope::from_combined(header, &combined).unwrap();
        let wire = envelope.encode().unwrap();

        let err = receive(&wire, &mut server_key, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Revoked);
    }

    #[test]
    fn send_produces_decryptable_envelope_with_c2s_key() {
        let (mut server_key, _client_key) = paired_keys();
        let now = Utc::now();
        let wire = send(&mut server_key, b"pong", now).unwrap();
        let envelope = Envelope::decode(&wire).unwrap();
        let aad = envelope.header.canonical_bytes().unwrap();
        let nonce = envelope.header.nonce_bytes().unwrap();
        let plaintext = open(&server_key.enc_key_s2c, &nonce, &aad, &envelope.combined()).unwrap();
        assert_eq!(plaintext, b"pong");
    }

    struct InMemoryStore {
        keys: AsyncMutex<HashMap<DeviceId, DeviceKey>>,
    }

    #[async_trait]
    impl DeviceKeyStore for InMemoryStore {
        async fn find(&self, device_id: DeviceId) -> Result<Option<DeviceKey>> {
            Ok(self.keys.lock().await.get(&device_id).cloned())
        }

        async fn store(&self, device_key: &DeviceKey) -> Result<()> {
            self.keys.lock().await.insert(device_key.device_id, device_key.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn admit_resolves_a_valid_token() {
        let (server_key, _) = paired_keys();
        let token = issue_device_token(&server_key);
        let store = InMemoryStore { keys: AsyncMutex::new(HashMap::new()) };
        store.store(&server_key).await.unwrap();

        let resolved = admit(&store, &token).await.unwrap();
        assert_eq!(resolved.device_id, server_key.device_id);
    }

    #[tokio::test]
    async fn admit_rejects_unknown_device() {
        let (server_key, _) = paired_keys();
        let token = issue_device_token(&server_key);
        let store = InMemoryStore { keys: AsyncMutex::new(HashMap::new()) };

        let err = admit(&store, &token).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownDevice);
    }

    #[tokio::test]
    async fn admit_rejects_revoked_device() {
        let (mut server_key, _) = paired_keys();
        let token = issue_device_token(&server_key);
        server_key.revoke();
        let store = InMemoryStore { keys: AsyncMutex::new(HashMap::new()) };
        store.store(&server_key).await.unwrap();

        let err = admit(&store, &token).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Revoked);
    }
}
