//! Mandate signature verification.
//!
//! A subscriber authorizes a mandate by signing its digest with the ed25519
//! key their address is derived from. Verification is side-effect free and
//! total: malformed keys or signatures are an ordinary "not authorized"
//! `false`, never an error, so an executor-facing caller cannot distinguish
//! a garbage signature from a wrong one by failure mode.

use crate::mandate::{Address, Mandate, MandateDigest};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Length in bytes of a mandate signature.
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Check that `signature` was produced over `digest` by the key behind the
/// claimed subscriber address.
///
/// Returns `false` on any of: claimed address is not a valid verifying key,
/// signature bytes are malformed, or the signature does not verify.
pub fn verify_mandate_signature(
    digest: &MandateDigest,
    signature: &[u8],
    claimed: &Address,
) -> bool {
    let key = match VerifyingKey::from_bytes(claimed.as_bytes()) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    key.verify(digest.as_bytes(), &signature).is_ok()
}

/// Sign a mandate's digest. Subscriber-side helper for offline tooling.
pub fn sign_mandate(mandate: &Mandate, key: &SigningKey) -> [u8; SIGNATURE_LENGTH] {
    key.sign(mandate.digest().as_bytes()).to_bytes()
}

/// Derive the subscriber address committed to in a mandate from a
/// verifying key.
pub fn subscriber_address(key: &VerifyingKey) -> Address {
    Address::from_bytes(key.to_bytes())
}
