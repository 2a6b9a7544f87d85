//! Protocol-level constants.
//!
//! Everything here is consensus-relevant in the loose sense: two nodes that
//! disagree on any of these values will compute different envelope hashes or
//! different amounts and their pre-authorized signers will never match.
//! Runtime knobs (ports, file paths, log filters) live with the node binary,
//! not here.

/// Version tag embedded at the front of every envelope's canonical byte
/// serialization. Bump only with a migration plan: changing it changes every
/// transaction hash.
pub const ENVELOPE_VERSION: u16 = 1;

/// Protocol release, reported by the node's status endpoint.
pub const PROTOCOL_VERSION: &str = "0.4.0";

/// Asset code of the delivery token that escrow accounts hold and branch
/// envelopes move.
pub const DELIVERY_TOKEN_CODE: &str = "CRGO";

/// Smallest indivisible token unit. All amounts in the protocol are integer
/// stroops; fractional tokens exist only at display time.
pub const STROOPS_PER_TOKEN: i64 = 10_000_000;

/// Native-lumen balance a freshly created escrow account is seeded with,
/// covering its base reserve plus fees for the setup ritual and one branch.
pub const ESCROW_STARTING_BALANCE_STROOPS: i64 = 50_000_000;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Transaction hash length in bytes (double SHA-256).
pub const TX_HASH_LENGTH: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroop_scale_is_seven_decimal_places() {
        assert_eq!(STROOPS_PER_TOKEN, 10i64.pow(7));
    }

    #[test]
    fn starting_balance_covers_whole_tokens() {
        assert_eq!(ESCROW_STARTING_BALANCE_STROOPS % STROOPS_PER_TOKEN, 0);
    }
}
