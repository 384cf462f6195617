//! Wire framing for a sealed device message: a canonical-JSON header used
//! as AEAD associated data, plus the AES-256-GCM ciphertext and tag,
//! base64url-no-pad encoded and joined by `.` (header.ciphertext.tag).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use n3n_core::{to_canonical_json_of, DeviceId};
use n3n_error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};

/// Envelope direction, matching the key each side encrypts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client (agent) to server.
    C2s,
    /// Server to client (agent).
    S2c,
}

/// The envelope header, serialized canonically and used as AEAD associated
/// data — any tampering with `did`/`ts`/`seq`/`dir` is caught by the AEAD
/// tag even though the header itself travels unencrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Protocol version. Only `1` is currently accepted.
    pub v: u8,
    pub alg: String,
    pub did: DeviceId,
    pub ts: DateTime<Utc>,
    pub seq: u64,
    pub nonce: String,
    pub dir: Direction,
}

pub const CURRENT_VERSION: u8 = 1;
pub const ALGORITHM: &str = "A256GCM";

impl Header {
    #[must_use]
    pub fn new(device_id: DeviceId, ts: DateTime<Utc>, seq: u64, nonce: [u8; 12], dir: Direction) -> Self {
        Self {
            v: CURRENT_VERSION,
            alg: ALGORITHM.to_string(),
            did: device_id,
            ts,
            seq,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
            dir,
        }
    }

    pub fn nonce_bytes(&self) -> Result<[u8; 12]> {
        let decoded = URL_SAFE_NO_PAD
            .decode(&self.nonce)
            .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid envelope nonce encoding", e))?;
        decoded
            .try_into()
            .map_err(|_| Error::validation("envelope nonce must be 12 bytes"))
    }

    /// Canonical JSON bytes of this header, used as AEAD associated data.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let json = to_canonical_json_of(self).map_err(|e| Error::with_source(ErrorKind::Validation, "failed to encode envelope header", e))?;
        Ok(json.into_bytes())
    }
}

/// A sealed message ready for transport.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub header: Header,
    /// AES-256-GCM ciphertext, tag excluded.
    pub ciphertext: Vec<u8>,
    /// 16-byte AEAD tag.
    pub tag: [u8; 16],
}

const TAG_LEN: usize = 16;

impl Envelope {
    /// Split a combined `seal()` output (ciphertext||tag) into its two wire
    /// fields.
    pub fn from_combined(header: Header, combined: &[u8]) -> Result<Self> {
        if combined.len() < TAG_LEN {
            return Err(Error::new(ErrorKind::Tampered, "sealed payload shorter than AEAD tag"));
        }
        let split = combined.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&combined[split..]);
        Ok(Self { header, ciphertext: combined[..split].to_vec(), tag })
    }

    /// Recombine ciphertext and tag for passing to [`crate::crypto::open`].
    #[must_use]
    pub fn combined(&self) -> Vec<u8> {
        let mut out = self.ciphertext.clone();
        out.extend_from_slice(&self.tag);
        out
    }

    /// Serialize to the wire form: `header.ciphertext.tag`, each segment
    /// base64url-no-pad encoded.
    pub fn encode(&self) -> Result<String> {
        let header_json = to_canonical_json_of(&self.header).map_err(|e| Error::with_source(ErrorKind::Validation, "failed to encode envelope header", e))?;
        let header_b64 = URL_SAFE_NO_PAD.encode(header_json.as_bytes());
        let ciphertext_b64 = URL_SAFE_NO_PAD.encode(&self.ciphertext);
        let tag_b64 = URL_SAFE_NO_PAD.encode(self.tag);
        Ok(format!("{header_b64}.{ciphertext_b64}.{tag_b64}"))
    }

    /// Parse the wire form back into an [`Envelope`].
    pub fn decode(wire: &str) -> Result<Self> {
        let mut parts = wire.split('.');
        let (Some(header_b64), Some(ciphertext_b64), Some(tag_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::validation("envelope must have exactly three dot-separated segments"));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid envelope header encoding", e))?;
        let header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid envelope header json", e))?;

        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid envelope ciphertext encoding", e))?;
        let tag_bytes = URL_SAFE_NO_PAD
            .decode(tag_b64)
            .map_err(|e| Error::with_source(ErrorKind::Validation, "invalid envelope tag encoding", e))?;
        let tag: [u8; TAG_LEN] = tag_bytes
            .try_into()
            .map_err(|_| Error::validation("envelope tag must be 16 bytes"))?;

        Ok(Self { header, ciphertext, tag })
    }
}
