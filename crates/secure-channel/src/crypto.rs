//! X25519 key agreement, HKDF-SHA256 key derivation, and AES-256-GCM
//! envelope sealing. Grounded on the AES-GCM test patterns in
//! `examples/vanyastaff-nebula/crates/credential/tests/units/encryption_tests.rs`
//! (the only file in the corpus exercising `aes_gcm`); X25519/HKDF have no
//! corpus precedent and are the pair of net-new dependencies this crate
//! requires (see DESIGN.md).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use n3n_error::{Error, ErrorKind, Result};
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::device_key::SymmetricKey;

/// `info` parameter for HKDF-SHA256 expansion, fixing this protocol version.
pub const HKDF_INFO: &[u8] = b"n3n-agent-v1";

/// Ephemeral X25519 keypair for one side of the registration handshake.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    pub public: PublicKey,
}

impl EphemeralKeypair {
    #[must_use]
    pub fn generate() -> Self {
        // x25519-dalek 2.0 is pinned to rand_core 0.6, one major behind the
        // workspace's rand 0.9 (rand_core 0.9), so key generation reaches
        // for rand_core::OsRng directly rather than `rand::rng()`.
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Consume the ephemeral secret in a Diffie-Hellman exchange with the
    /// peer's public key, producing the raw shared secret.
    #[must_use]
    pub fn diffie_hellman(self, peer_public: &PublicKey) -> [u8; 32] {
        self.secret.diffie_hellman(peer_public).to_bytes()
    }
}

/// The three keys derived from one registration's shared secret.
pub struct DerivedKeys {
    pub enc_key_c2s: [u8; 32],
    pub enc_key_s2c: [u8; 32],
    pub auth_key: [u8; 32],
}

/// Derive `encKeyC2S`/`encKeyS2C`/`authKey` via HKDF-SHA256.
///
/// Salt is `deviceId || userId` (raw UUID bytes), info is [`HKDF_INFO`].
/// Each key is a distinct 32-byte HKDF-expand output, disambiguated by a
/// one-byte suffix appended to `info` so the three outputs are
/// cryptographically independent rather than slices of one expansion.
#[must_use]
pub fn derive_keys(shared_secret: &[u8; 32], device_id_bytes: &[u8; 16], user_id_bytes: &[u8; 16]) -> DerivedKeys {
    let mut salt = Vec::with_capacity(32);
    salt.extend_from_slice(device_id_bytes);
    salt.extend_from_slice(user_id_bytes);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);

    let mut enc_key_c2s = [0u8; 32];
    let mut enc_key_s2c = [0u8; 32];
    let mut auth_key = [0u8; 32];
    expand(&hk, b"c2s", &mut enc_key_c2s);
    expand(&hk, b"s2c", &mut enc_key_s2c);
    expand(&hk, b"auth", &mut auth_key);

    DerivedKeys { enc_key_c2s, enc_key_s2c, auth_key }
}

fn expand(hk: &Hkdf<Sha256>, label: &[u8], out: &mut [u8; 32]) {
    let mut info = Vec::with_capacity(HKDF_INFO.len() + 1 + label.len());
    info.extend_from_slice(HKDF_INFO);
    info.push(b'|');
    info.extend_from_slice(label);
    hk.expand(&info, out).expect("32 bytes is within HKDF-SHA256's output range");
}

/// AES-256-GCM seal. `nonce` must be 12 bytes and never reused under the
/// same key. `aad` is the envelope header's canonical JSON bytes. Returns
/// ciphertext with the 16-byte tag appended, matching the combined form
/// `aes-gcm` produces; callers that need the wire's separate
/// ciphertext/tag fields split the last 16 bytes off themselves.
pub fn seal(key: &SymmetricKey, nonce: &[u8; 12], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|e| Error::handler_error(format!("invalid AES-256 key: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| Error::handler_error("AEAD seal failed"))
}

/// AES-256-GCM open. `combined` is ciphertext with the 16-byte tag
/// appended, as produced by [`seal`].
pub fn open(key: &SymmetricKey, nonce: &[u8; 12], aad: &[u8], combined: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|e| Error::handler_error(format!("invalid AES-256 key: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: combined, aad })
        .map_err(|_| Error::new(ErrorKind::Tampered, "AEAD open failed: ciphertext or AAD does not match"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_agreement_produces_shared_secret() {
        let alice = EphemeralKeypair::generate();
        let bob = EphemeralKeypair::generate();
        let alice_public = alice.public;
        let bob_public = bob.public;
        let alice_shared = alice.diffie_hellman(&bob_public);
        let bob_shared = bob.diffie_hellman(&alice_public);
        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn derived_keys_are_distinct() {
        let shared = [7u8; 32];
        let keys = derive_keys(&shared, &[1u8; 16], &[2u8; 16]);
        assert_ne!(keys.enc_key_c2s, keys.enc_key_s2c);
        assert_ne!(keys.enc_key_c2s, keys.auth_key);
        assert_ne!(keys.enc_key_s2c, keys.auth_key);
    }

    #[test]
    fn derive_keys_is_deterministic() {
        let shared = [9u8; 32];
        let a = derive_keys(&shared, &[1u8; 16], &[2u8; 16]);
        let b = derive_keys(&shared, &[1u8; 16], &[2u8; 16]);
        assert_eq!(a.enc_key_c2s, b.enc_key_c2s);
        assert_eq!(a.auth_key, b.auth_key);
    }

    #[test]
    fn seal_then_open_roundtrips() {
        use zeroize::Zeroizing;
        let key: SymmetricKey = Zeroizing::new([3u8; 32]);
        let nonce = [0u8; 12];
        let aad = b"header-bytes";
        let sealed = seal(&key, &nonce, aad, b"hello").unwrap();
        let opened = open(&key, &nonce, aad, &sealed).unwrap();
        assert_eq!(opened, b"hello");
    }

    #[test]
    fn open_rejects_tampered_aad() {
        use zeroize::Zeroizing;
        let key: SymmetricKey = Zeroizing::new([3u8; 32]);
        let nonce = [0u8; 12];
        let sealed = seal(&key, &nonce, b"header-a", b"hello").unwrap();
        assert!(open(&key, &nonce, b"header-b", &sealed).is_err());
    }

    #[test]
    fn open_rejects_tampered_ciphertext() {
        use zeroize::Zeroizing;
        let key: SymmetricKey = Zeroizing::new([3u8; 32]);
        let nonce = [0u8; 12];
        let mut sealed = seal(&key, &nonce, b"header", b"hello").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(open(&key, &nonce, b"header", &sealed).is_err());
    }
}
