//! Webhook trigger ingress (spec §6): matching an inbound request to an
//! active `Webhook` and applying its auth rule before the caller goes on to
//! call [`Engine::start_execution`](crate::Engine).
//!
//! The HTTP surface itself (routing, request parsing) is out of scope —
//! this module is the part of trigger ingress that belongs to the core:
//! given a path/method already extracted by that external surface, decide
//! which `Webhook` it matches and whether its signature checks out.
//! Grounded on `crates/secure-channel/src/registration.rs`'s
//! `HMAC-SHA256` + constant-time-compare shape, the only other place in
//! this workspace verifies a keyed signature.

use hmac::{Hmac, Mac};
use n3n_core::{FlowId, WebhookId};
use n3n_error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The auth rule attached to a `Webhook` (spec §6: `none | hmac`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WebhookAuth {
    None,
    Hmac { secret: String },
}

/// An active webhook registration: the `(path, method)` an inbound request
/// is matched against, and the flow it triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: WebhookId,
    pub flow_id: FlowId,
    pub path: String,
    pub method: String,
    pub auth: WebhookAuth,
}

/// Find the active webhook matching an inbound request's path and method.
/// Method comparison is case-insensitive (`GET` == `get`); path comparison
/// is exact.
#[must_use]
pub fn match_webhook<'a>(webhooks: &'a [Webhook], path: &str, method: &str) -> Option<&'a Webhook> {
    webhooks.iter().find(|w| w.path == path && w.method.eq_ignore_ascii_case(method))
}

/// Apply a matched webhook's auth rule to an inbound request body and
/// caller-supplied signature. `None` rules always pass; `Hmac` rules
/// recompute `HMAC-SHA256(secret, body)` and compare it to `provided_signature`
/// (hex-encoded) in constant time.
///
/// Returns `Err(PermissionDenied)` on a verification failure — a generic
/// rejection, per spec §7's "return a generic `DENIED` to unauthenticated
/// peers to avoid oracle attacks" guidance for transport-adjacent auth.
pub fn verify_webhook_auth(webhook: &Webhook, body: &[u8], provided_signature: Option<&str>) -> Result<()> {
    match &webhook.auth {
        WebhookAuth::None => Ok(()),
        WebhookAuth::Hmac { secret } => {
            let provided = provided_signature.ok_or_else(|| Error::permission_denied("missing webhook signature"))?;
            let provided_bytes =
                hex::decode(provided).map_err(|_| Error::permission_denied("malformed webhook signature"))?;

            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts any key length");
            mac.update(body);
            let expected = mac.finalize().into_bytes();

            if expected.len() == provided_bytes.len() && bool::from(expected.ct_eq(&provided_bytes)) {
                Ok(())
            } else {
                Err(Error::permission_denied("webhook signature mismatch"))
            }
        }
    }
}
