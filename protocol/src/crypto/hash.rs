//! # Hashing
//!
//! Transaction identities on the Caravan ledger are double-SHA-256 digests
//! of a canonical byte serialization. The double hash matches what the
//! surrounding ledger ecosystem expects for pre-authorized transaction
//! signers: a signer entry carries the digest, and a submission matches it
//! only if the submitted bytes hash to exactly that digest.
//!
//! Keep this module boring. A surprising hash function invalidates every
//! pre-authorized signer ever configured.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` as a fixed-size array.
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Compute `SHA-256(SHA-256(data))`.
///
/// This is the digest embedded as a `PreAuthTx` signer identity and used as
/// the transaction identifier everywhere in the protocol.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256_array(&sha256_array(data))
}
