use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use mochi_core::EntityId;

/// An entity's Ed25519 keypair. `public_material` is what gets published in
/// the directory store and fingerprinted; `signing_key` never leaves this
/// struct unencrypted once persisted (see [`crate::envelope`]).
pub struct EntityKeyPair {
    signing_key: SigningKey,
}

impl EntityKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        EntityKeyPair { signing_key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        EntityKeyPair {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_material(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The entity's fingerprint: `H(public_material)`, per the core's
    /// data-model invariant, truncated to a 32-byte `EntityId`.
    pub fn entity_id(&self) -> EntityId {
        fingerprint_id(&self.public_material())
    }

    pub fn fingerprint_hex(&self) -> String {
        hex_string(&Sha256::digest(self.public_material()))
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Derives the 32-byte entity id directly from public material via SHA-256,
/// matching the `fingerprint = H(public_material)` invariant (entity ids and
/// fingerprints share the same hash, fingerprints are additionally hex-
/// encoded for display).
pub fn fingerprint_id(public_material: &[u8; 32]) -> EntityId {
    let digest = Sha256::digest(public_material);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    EntityId(out)
}

pub fn verify(public_material: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_material)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature("wrong signature length".into()))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key
        .verify(message, &signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = EntityKeyPair::generate();
        let message = b"hello mochi";
        let signature = keypair.sign(message);
        verify(&keypair.public_material(), message, &signature).unwrap();
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let a = EntityKeyPair::generate();
        let b = EntityKeyPair::generate();
        let signature = a.sign(b"payload");
        let err = verify(&b.public_material(), b"payload", &signature).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSignature(_)));
    }

    #[test]
    fn fingerprint_is_stable_for_same_material() {
        let keypair = EntityKeyPair::generate();
        let a = keypair.entity_id();
        let b = fingerprint_id(&keypair.public_material());
        assert_eq!(a, b);
    }
}
