//! One-time-token device registration (spec §4.5 steps 1-5).
//!
//! The server mints a short-lived, single-use token and hands it to the
//! user out of band (e.g. displayed as a QR code). The agent presents the
//! token plus its X25519 public key; the server verifies the token is
//! still pending, performs the key agreement, derives the three session
//! keys, and returns its own public key plus a `deviceToken` the agent
//! presents on every subsequent websocket connection.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use n3n_core::{DeviceId, UserId};
use n3n_error::{Error, ErrorKind, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::PublicKey;

use crate::crypto::{derive_keys, EphemeralKeypair};
use crate::device_key::DeviceKey;

type HmacSha256 = Hmac<Sha256>;

/// Status of a minted registration token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Pending,
    Registered,
    Blocked,
}

/// A minted, not-yet-consumed (or already consumed) registration token.
///
/// Only the SHA-256 hash of the token is persisted; the plaintext token is
/// returned once from [`mint`] and never stored.
#[derive(Debug, Clone)]
pub struct RegistrationToken {
    pub token_hash: String,
    pub user_id: UserId,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
}

/// Mint a fresh registration token for `user_id`. Returns the plaintext
/// token (to be shown to the user out of band) and the record to persist.
#[must_use]
pub fn mint(user_id: UserId, now: DateTime<Utc>) -> (String, RegistrationToken) {
    let mut raw = [0u8; 32];
    rand::rng().fill_bytes(&mut raw);
    let token = URL_SAFE_NO_PAD.encode(raw);
    let record = RegistrationToken { token_hash: hash_token(&token), user_id, status: TokenStatus::Pending, created_at: now };
    (token, record)
}

#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// The agent's registration request: the presented token plus its identity
/// and ephemeral X25519 public key.
pub struct RegistrationRequest {
    pub token: String,
    pub device_id: DeviceId,
    pub device_name: String,
    pub platform: String,
    pub device_fingerprint: String,
    pub device_public_key: [u8; 32],
}

/// The server's response to a successful registration.
pub struct RegistrationResponse {
    pub platform_public_key: [u8; 32],
    pub platform_fingerprint: String,
    pub device_token: String,
}

/// Complete a pending registration: verify the token, perform the X25519
/// key agreement, derive session keys, and mint the agent's `deviceToken`.
///
/// Returns the [`DeviceKey`] to persist and the response to send back to
/// the agent. The caller is responsible for checking `record.status` is
/// [`TokenStatus::Pending`] before calling this (a non-pending token is a
/// caller error, not something this function re-validates against storage).
pub fn complete(
    request: &RegistrationRequest,
    record: &RegistrationToken,
    platform_fingerprint: String,
    now: DateTime<Utc>,
) -> Result<(DeviceKey, RegistrationResponse)> {
    if record.status != TokenStatus::Pending {
        return Err(Error::new(ErrorKind::Conflict, "registration token is not pending"));
    }
    if hash_token(&request.token) != record.token_hash {
        return Err(Error::new(ErrorKind::Validation, "registration token does not match"));
    }

    let device_public = PublicKey::from(request.device_public_key);
    let platform_keypair = EphemeralKeypair::generate();
    let platform_public = platform_keypair.public;
    let shared_secret = platform_keypair.diffie_hellman(&device_public);

    let keys = derive_keys(&shared_secret, request.device_id.as_bytes(), record.user_id.as_bytes());

    let device_key = DeviceKey::new(
        request.device_id,
        record.user_id,
        request.device_name.clone(),
        request.platform.clone(),
        request.device_fingerprint.clone(),
        keys.enc_key_c2s,
        keys.enc_key_s2c,
        keys.auth_key,
        now,
    );

    let device_token = issue_device_token(&device_key);

    Ok((
        device_key,
        RegistrationResponse {
            platform_public_key: platform_public.to_bytes(),
            platform_fingerprint,
            device_token,
        },
    ))
}

/// A self-describing bearer token for websocket admission:
/// `base64url(deviceId || HMAC-SHA256(authKey, deviceId))`. Gives the
/// otherwise-unused `authKey` HKDF output a concrete purpose and avoids a
/// separate token-lookup table — admission only needs the claimed
/// `deviceId`'s `DeviceKey` to verify the MAC.
#[must_use]
pub fn issue_device_token(device_key: &DeviceKey) -> String {
    let device_id_bytes = device_key.device_id.as_bytes();
    let mut mac = HmacSha256::new_from_slice(device_key.auth_key.as_ref()).expect("HMAC accepts any key length");
    mac.update(device_id_bytes);
    let tag = mac.finalize().into_bytes();

    let mut payload = Vec::with_capacity(16 + tag.len());
    payload.extend_from_slice(device_id_bytes);
    payload.extend_from_slice(&tag);
    URL_SAFE_NO_PAD.encode(payload)
}

/// Verify a `deviceToken` against the claimed device's key, in constant
/// time. Returns the device id encoded in the token on success.
pub fn verify_device_token(token: &str, device_key: &DeviceKey) -> Result<DeviceId> {
    let payload = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid device token encoding", e))?;
    if payload.len() != 16 + 32 {
        return Err(Error::validation("device token has the wrong length"));
    }
    let (device_id_bytes, tag) = payload.split_at(16);
    let device_id = DeviceId::from_bytes(device_id_bytes.try_into().expect("split_at(16) yields 16 bytes"));
    if device_id != device_key.device_id {
        return Err(Error::new(ErrorKind::UnknownDevice, "device token does not match the resolved device"));
    }

    let mut mac = HmacSha256::new_from_slice(device_key.auth_key.as_ref()).expect("HMAC accepts any key length");
    mac.update(device_id_bytes);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(tag).into() {
        Ok(device_id)
    } else {
        Err(Error::new(ErrorKind::Tampered, "device token MAC is invalid"))
    }
}
