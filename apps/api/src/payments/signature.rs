//! Webhook signature verification.
//!
//! The processor signs the exact request bytes with HMAC-SHA256 and sends the hex digest
//! in `X-Signature`. Verification must run over the raw body as received: re-serializing
//! parsed JSON reorders keys and breaks the digest.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::WebhookSecret;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Raw body bytes whose signature has been checked.
/// Only `SignatureVerifier::verify` can construct one.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedBody<'a>(&'a [u8]);

impl<'a> VerifiedBody<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    MissingHeader,
    NotHex,
    Mismatch,
}

#[derive(Debug)]
pub enum Verification<'a> {
    Valid(VerifiedBody<'a>),
    Invalid(InvalidReason),
}

impl Verification<'_> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }
}

/// Holds a MAC already keyed with the webhook secret; each check works on a clone.
#[derive(Clone)]
pub struct SignatureVerifier {
    keyed: HmacSha256,
}

impl SignatureVerifier {
    pub fn new(secret: &WebhookSecret) -> Result<Self, InvalidLength> {
        Ok(Self {
            keyed: <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())?,
        })
    }

    /// Checks `signature` (hex, any case) against HMAC-SHA256(secret, body).
    /// The digest comparison is constant-time; a wrong-length signature is a mismatch.
    pub fn verify<'a>(&self, body: &'a [u8], signature: Option<&str>) -> Verification<'a> {
        let Some(signature) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            return Verification::Invalid(InvalidReason::MissingHeader);
        };
        let Ok(expected) = hex::decode(signature) else {
            return Verification::Invalid(InvalidReason::NotHex);
        };

        match self.mac(body).verify_slice(&expected) {
            Ok(()) => Verification::Valid(VerifiedBody(body)),
            Err(_) => Verification::Invalid(InvalidReason::Mismatch),
        }
    }

    /// Lowercase hex signature for `body`, as the processor would send it.
    pub fn sign(&self, body: &[u8]) -> String {
        hex::encode(self.mac(body).finalize().into_bytes())
    }

    fn mac(&self, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(body);
        mac
    }
}
