//! Ed25519 proof-of-possession check for validator keys.

use ed25519_dalek::{Signature, VerifyingKey};
use sysvm_eei::{MessageSignVerifier, VerifyError};

/// Strict Ed25519 verification of `signed_message` over `message`, with
/// `pub_key` as the 32-byte verifying key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519SignVerifier;

impl MessageSignVerifier for Ed25519SignVerifier {
    fn verify(&self, message: &[u8], signed_message: &[u8], pub_key: &[u8]) -> Result<(), VerifyError> {
        let pk: &[u8; 32] = pub_key.try_into().map_err(|_| VerifyError::InvalidPublicKey)?;
        let vk = VerifyingKey::from_bytes(pk).map_err(|_| VerifyError::InvalidPublicKey)?;
        let sig = Signature::from_slice(signed_message).map_err(|_| VerifyError::InvalidSignature)?;
        vk.verify_strict(message, &sig)
            .map_err(|_| VerifyError::InvalidSignature)
    }
}
