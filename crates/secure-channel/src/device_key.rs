//! `DeviceKey`: the persistent cryptographic state bound to a paired agent.

use chrono::{DateTime, Utc};
use n3n_core::{DeviceId, UserId};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

/// 32-byte symmetric key, zeroized on drop.
pub type SymmetricKey = Zeroizing<[u8; 32]>;

/// The persistent cryptographic state bound to a paired agent.
///
/// Owned by exactly one user. `last_sequence` is monotonic for the lifetime
/// of the key; revoked keys are never resurrected — re-pairing mints a new
/// `DeviceKey`.
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceKey {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub device_name: String,
    pub platform: String,
    pub fingerprint: String,
    pub enc_key_c2s: SymmetricKey,
    pub enc_key_s2c: SymmetricKey,
    pub auth_key: SymmetricKey,
    /// Highest inbound (c2s) sequence number accepted so far.
    pub last_sequence: u64,
    /// Outbound (s2c) counter, seeded from wall-clock milliseconds at
    /// registration so it cannot collide with a prior process's counter
    /// after a restart (Open Question #3: sequence numbers are
    /// per-direction, never shared between c2s and s2c).
    pub outbound_sequence: u64,
    pub paired_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub revoked: bool,
}

impl DeviceKey {
    #[must_use]
    pub fn new(
        device_id: DeviceId,
        user_id: UserId,
        device_name: String,
        platform: String,
        fingerprint: String,
        enc_key_c2s: [u8; 32],
        enc_key_s2c: [u8; 32],
        auth_key: [u8; 32],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            user_id,
            device_name,
            platform,
            fingerprint,
            enc_key_c2s: Zeroizing::new(enc_key_c2s),
            enc_key_s2c: Zeroizing::new(enc_key_s2c),
            auth_key: Zeroizing::new(auth_key),
            last_sequence: 0,
            outbound_sequence: seed_outbound_sequence(),
            paired_at: now,
            last_active_at: now,
            revoked: false,
        }
    }

    /// Allocate and claim the next outbound sequence number.
    pub fn next_outbound_sequence(&mut self) -> u64 {
        self.outbound_sequence += 1;
        self.outbound_sequence
    }

    pub fn revoke(&mut self) {
        self.revoked = true;
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.revoked
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKey")
            .field("device_id", &self.device_id)
            .field("user_id", &self.user_id)
            .field("device_name", &self.device_name)
            .field("platform", &self.platform)
            .field("fingerprint", &self.fingerprint)
            .field("last_sequence", &self.last_sequence)
            .field("outbound_sequence", &self.outbound_sequence)
            .field("revoked", &self.revoked)
            .finish_non_exhaustive()
    }
}

fn seed_outbound_sequence() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
