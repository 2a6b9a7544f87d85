//! # Package Lifecycle
//!
//! A small state machine tracking custody and settlement of one package.
//! It performs no ledger I/O: events are submission outcomes reported by
//! whoever talks to the ledger, and the machine is pure bookkeeping over
//! them.

use caravan_protocol::CaravanPublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a package stands. `Delivered` and `Refunded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    /// In the first courier's custody.
    Launched,
    /// Handed off at least once; in a relay courier's custody.
    Relayed,
    /// The current leg's payment envelope landed with the recipient's
    /// co-signature.
    Delivered,
    /// The original leg's refund envelope landed at or after the deadline.
    Refunded,
}

impl PackageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageState::Delivered | PackageState::Refunded)
    }
}

/// Externally reported outcomes that drive the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PackageEvent {
    /// Custody moved to a new courier. Repeatable while in custody.
    HandedOff { custodian: CaravanPublicKey },
    /// A payment branch was reported submitted successfully.
    PaymentConfirmed,
    /// The refund branch was reported submitted successfully.
    RefundConfirmed,
}

#[derive(Debug, Error)]
#[error("event {event:?} is not valid in state {current:?}")]
pub struct InvalidTransition {
    pub current: PackageState,
    pub event: PackageEvent,
}

/// Lifecycle tracker for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLifecycle {
    state: PackageState,
    custodian: CaravanPublicKey,
}

impl PackageLifecycle {
    /// A freshly launched package in `courier`'s custody.
    pub fn launched(courier: CaravanPublicKey) -> Self {
        Self {
            state: PackageState::Launched,
            custodian: courier,
        }
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    /// The party currently holding the package.
    pub fn custodian(&self) -> CaravanPublicKey {
        self.custodian
    }

    /// Apply one reported event, returning the new state.
    pub fn apply(&mut self, event: PackageEvent) -> Result<PackageState, InvalidTransition> {
        let next = match (self.state, event) {
            (PackageState::Launched | PackageState::Relayed, PackageEvent::HandedOff { custodian }) => {
                self.custodian = custodian;
                PackageState::Relayed
            }
            (PackageState::Launched | PackageState::Relayed, PackageEvent::PaymentConfirmed) => {
                PackageState::Delivered
            }
            (PackageState::Launched | PackageState::Relayed, PackageEvent::RefundConfirmed) => {
                PackageState::Refunded
            }
            (current, event) => return Err(InvalidTransition { current, event }),
        };
        tracing::debug!(from = ?self.state, to = ?next, "package transition");
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caravan_protocol::CaravanKeypair;

    fn key() -> CaravanPublicKey {
        CaravanKeypair::generate().public_key()
    }

    #[test]
    fn delivery_straight_from_launch() {
        let mut pkg = PackageLifecycle::launched(key());
        assert_eq!(pkg.apply(PackageEvent::PaymentConfirmed).unwrap(), PackageState::Delivered);
        assert!(pkg.state().is_terminal());
    }

    #[test]
    fn refund_straight_from_launch() {
        let mut pkg = PackageLifecycle::launched(key());
        assert_eq!(pkg.apply(PackageEvent::RefundConfirmed).unwrap(), PackageState::Refunded);
    }

    #[test]
    fn handoffs_repeat_and_track_custody() {
        let mut pkg = PackageLifecycle::launched(key());
        let second = key();
        let third = key();
        pkg.apply(PackageEvent::HandedOff { custodian: second }).unwrap();
        assert_eq!(pkg.state(), PackageState::Relayed);
        assert_eq!(pkg.custodian(), second);
        pkg.apply(PackageEvent::HandedOff { custodian: third }).unwrap();
        assert_eq!(pkg.custodian(), third);
        assert_eq!(pkg.apply(PackageEvent::PaymentConfirmed).unwrap(), PackageState::Delivered);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let courier = key();
        for terminal_event in [PackageEvent::PaymentConfirmed, PackageEvent::RefundConfirmed] {
            let mut pkg = PackageLifecycle::launched(courier);
            pkg.apply(terminal_event).unwrap();
            for event in [
                PackageEvent::HandedOff { custodian: key() },
                PackageEvent::PaymentConfirmed,
                PackageEvent::RefundConfirmed,
            ] {
                let err = pkg.apply(event).unwrap_err();
                assert_eq!(err.current, pkg.state());
            }
        }
    }
}
