//! The Secure Device Channel (spec component C5): one-time-token device
//! pairing, X25519 key agreement, AES-256-GCM framed messaging with replay
//! defense, and revocation.
//!
//! Deliberately decoupled from the execution engine's storage layer — see
//! [`channel::DeviceKeyStore`] — since pairing and messaging are orthogonal
//! to flow execution.

mod channel;
mod crypto;
mod device_key;
mod envelope;
mod registration;

pub use channel::{admit, extract_device_token, receive, send, DeviceKeyStore, TokenLocation, CLOCK_SKEW_TOLERANCE};
pub use crypto::{derive_keys, open, seal, DerivedKeys, EphemeralKeypair, HKDF_INFO};
pub use device_key::{DeviceKey, SymmetricKey};
pub use envelope::{Direction, Envelope, Header, ALGORITHM, CURRENT_VERSION};
pub use registration::{complete, hash_token, issue_device_token, mint, verify_device_token, RegistrationRequest, RegistrationResponse, RegistrationToken, TokenStatus};
