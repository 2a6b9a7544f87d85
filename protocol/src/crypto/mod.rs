//! Cryptographic primitives used by the Caravan ledger layer.
//!
//! Two concerns live here and nothing else: Ed25519 identity keys and the
//! double-SHA-256 construction used for transaction hashes. Anything fancier
//! belongs in a dedicated crate, not in an escrow protocol.

pub mod hash;
pub mod keys;

pub use hash::{double_sha256, sha256_array};
pub use keys::{CaravanKeypair, CaravanPublicKey, CaravanSignature, KeyError};
