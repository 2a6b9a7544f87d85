//! # Identity Keys
//!
//! Ed25519 keypairs for every party on the Caravan network: launchers,
//! couriers, recipients, token issuers, and the single-use escrow accounts
//! themselves.
//!
//! Escrow accounts are the reason this module is strict about key handling:
//! an escrow keypair is generated fresh for every package, used to sign two
//! setup transactions, and then neutered on the ledger (master weight zero).
//! Between generation and neutering, the seed is the whole security model.
//!
//! Secret material is never serialized implicitly and never logged. The
//! `Debug` and `Display` impls only ever show public halves; callers that
//! genuinely need to show a seed (devnet key generation, test fixtures) must
//! opt in through [`fmt_unlocked`].

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors from key parsing and validation.
///
/// Deliberately vague about the *why* — error messages that describe key
/// material are a leak waiting to happen.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or malformed encoding")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature bytes: wrong length")]
    InvalidSignature,
}

/// The public half of a Caravan identity.
///
/// This is what appears in envelopes, signer lists, and package records.
/// Serialized as a 64-character hex string so that JSON payloads and
/// persisted records stay human-greppable.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaravanPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 keypair: a public key plus the secret seed.
///
/// A plain value pair — no subclassing, no display trickery. How a keypair
/// is *shown* is a separate decision made per call site via [`fmt_locked`]
/// and [`fmt_unlocked`].
pub struct CaravanKeypair {
    signing_key: SigningKey,
}

/// A 64-byte Ed25519 signature over an envelope's canonical bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct CaravanSignature {
    bytes: [u8; 64],
}

impl CaravanKeypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    ///
    /// This is how every escrow account is born. Never reuse the result
    /// across packages — single use is a protocol invariant, not a
    /// suggestion.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load a keypair from a hex-encoded seed, e.g. a key file written by
    /// `caravan-node keygen`.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The public half of this identity.
    pub fn public_key(&self) -> CaravanPublicKey {
        CaravanPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message (an envelope's canonical bytes, in practice).
    ///
    /// Ed25519 signing is deterministic, so signing the same envelope twice
    /// yields the same signature — convenient for idempotent submission.
    pub fn sign(&self, message: &[u8]) -> CaravanSignature {
        CaravanSignature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    /// Export the raw seed. Handle with the care a bearer instrument
    /// deserves; until the escrow account is frozen this *is* the money.
    pub fn secret_seed(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for CaravanKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for CaravanKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Public half only. Seeds do not belong in debug output.
        write!(f, "CaravanKeypair(pub={})", self.public_key())
    }
}

impl PartialEq for CaravanKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl Eq for CaravanKeypair {}

// ---------------------------------------------------------------------------
// Display formatting — chosen per call site
// ---------------------------------------------------------------------------

/// Format an identity without secret material: `pubkey (base58)`.
pub fn fmt_locked(public: &CaravanPublicKey) -> String {
    format!("key {}", public.to_base58())
}

/// Format an identity *with* its seed. Devnet and test output only.
pub fn fmt_unlocked(keypair: &CaravanKeypair) -> String {
    format!(
        "key {} (seed {})",
        keypair.public_key().to_base58(),
        hex::encode(keypair.secret_seed())
    )
}

// ---------------------------------------------------------------------------
// CaravanPublicKey
// ---------------------------------------------------------------------------

impl CaravanPublicKey {
    /// Wrap raw bytes without point validation.
    ///
    /// For bytes of unverified provenance, prefer
    /// [`try_from_slice`](Self::try_from_slice), which rejects values that
    /// are not points on the curve.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Validate and wrap a byte slice.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a signature over `message` against this key.
    ///
    /// Returns a plain boolean: callers in the ledger's authorization path
    /// only care whether the weight counts, not why a signature was bad.
    pub fn verify(&self, message: &[u8], signature: &CaravanSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&signature.bytes);
        verifying_key.verify(message, &sig).is_ok()
    }

    /// Hex encoding, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes: arr })
    }

    /// Base58 encoding — the user-facing address form.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.bytes).into_string()
    }
}

impl fmt::Display for CaravanPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for CaravanPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CaravanPublicKey({}…)", &self.to_hex()[..12])
    }
}

impl Serialize for CaravanPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CaravanPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CaravanSignature
// ---------------------------------------------------------------------------

impl CaravanSignature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes: arr })
    }
}

impl fmt::Debug for CaravanSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "CaravanSignature({}…)", &hex_str[..12])
    }
}

impl Serialize for CaravanSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CaravanSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
