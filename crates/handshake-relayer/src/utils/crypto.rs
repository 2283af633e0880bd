// Cryptographic utilities

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Calculate SHA256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive a deterministic Ed25519 signing key from a seed phrase
pub fn signing_key_from_seed(seed: &str) -> SigningKey {
    SigningKey::from_bytes(&sha256(seed.as_bytes()))
}

/// Sign a message with an Ed25519 key
pub fn sign_ed25519(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    key.sign(message).to_bytes().to_vec()
}

/// Verify Ed25519 signature
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_ed25519_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(signature) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(public_key) = VerifyingKey::from_bytes(&public_key) else {
        return false;
    };
    let signature = Signature::from_bytes(&signature);

    public_key.verify(message, &signature).is_ok()
}

/// Generate Merkle root from leaves
pub fn calculate_merkle_root(leaves: &[Vec<u8>]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0; 32];
    }

    if leaves.len() == 1 {
        return sha256(&leaves[0]);
    }

    // Simple binary Merkle tree implementation
    let mut level = leaves.iter().map(|leaf| sha256(leaf)).collect::<Vec<_>>();

    while level.len() > 1 {
        let mut next_level = Vec::new();

        for chunk in level.chunks(2) {
            let hash = if chunk.len() == 2 {
                let mut combined = Vec::new();
                combined.extend_from_slice(&chunk[0]);
                combined.extend_from_slice(&chunk[1]);
                sha256(&combined)
            } else {
                chunk[0]
            };
            next_level.push(hash);
        }

        level = next_level;
    }

    level[0]
}
