//! Schnorr key wrappers for the signature-checking opcodes.
//!
//! The machine never does curve math itself; it parses witness bytes into
//! these types and asks them for a verdict. Signing exists for callers and
//! tests that need to produce valid witnesses.

use crate::errors::VmError;
use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Length of an encoded (x-only) public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an encoded signature.
pub const SIGNATURE_LEN: usize = 64;

/// Private key for producing witness signatures.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key for signature verification.
///
/// `Copy` - keys are parsed out of witness data on every CHECKSIG and
/// should live on the stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        let mut rng = OsRng;
        Self {
            key: SigningKey::random(&mut rng),
        }
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: *self.key.verifying_key(),
        }
    }

    /// Signs a message, producing an encoded Schnorr signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        let sig: Signature = self.key.sign(msg);
        sig.to_bytes().to_vec()
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKey {
    /// Parses an encoded public key.
    ///
    /// The underlying decoding error is carried in the returned
    /// [`VmError::BadPublicKey`]; malformed keys in witness data are hard
    /// verification failures, not a false result.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VmError> {
        VerifyingKey::from_bytes(bytes)
            .map(|key| Self { key })
            .map_err(|e| VmError::BadPublicKey {
                reason: e.to_string(),
            })
    }

    /// Returns the encoded form of the key.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.key.to_bytes().into()
    }

    /// Verifies an encoded signature over `msg`.
    ///
    /// A signature that does not even parse is simply invalid (`false`);
    /// only key encoding problems are errors.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> bool {
        match Signature::try_from(signature) {
            Ok(sig) => self.key.verify(msg, &sig).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let key = PrivateKey::new();
        let msg = [7u8; 32];
        let sig = key.sign(&msg);
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(key.public_key().verify(&msg, &sig));
    }

    #[test]
    fn wrong_message_fails() {
        let key = PrivateKey::new();
        let sig = key.sign(&[7u8; 32]);
        assert!(!key.public_key().verify(&[8u8; 32], &sig));
    }

    #[test]
    fn wrong_key_fails() {
        let msg = [7u8; 32];
        let sig = PrivateKey::new().sign(&msg);
        assert!(!PrivateKey::new().public_key().verify(&msg, &sig));
    }

    #[test]
    fn public_key_encoding_roundtrip() {
        let pk = PrivateKey::new().public_key();
        let decoded = PublicKey::from_slice(&pk.to_bytes()).unwrap();
        assert_eq!(decoded, pk);
    }

    #[test]
    fn malformed_public_key_is_an_error() {
        assert!(matches!(
            PublicKey::from_slice(&[0u8; 31]),
            Err(VmError::BadPublicKey { .. })
        ));
    }

    #[test]
    fn malformed_signature_is_just_invalid() {
        let key = PrivateKey::new();
        assert!(!key.public_key().verify(&[7u8; 32], &[0u8; 10]));
    }
}
