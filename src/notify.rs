//! Events reported to the host-side control channel.
//!
//! Every command produces exactly one terminal notification for its
//! originator, possibly preceded by progress ([`Notify::Acquiring`]).
//! Conflict losses arrive unprompted, tagged with the token that made the
//! original reservation.

use crate::{AddrRange, Error, MacAddr, RangeId, RangeState, SenderToken};

/// A peer's claim as carried in a conflicting PDU.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerClaim {
    pub stream_id: u64,
    pub range: AddrRange,
}

/// Snapshot of a claim for a status answer.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeReport {
    pub range: AddrRange,
    pub state: RangeState,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// Pool configured; the engine accepts reservations.
    Initialized { base: MacAddr, count: u32 },
    InitFailed { reason: Error },
    /// Probing started for a fresh reservation.
    Acquiring { id: RangeId, range: AddrRange },
    /// Probing finished without conflict; the block is ours.
    Acquired { id: RangeId, range: AddrRange },
    ReserveFailed { length: u32, reason: Error },
    Released { id: RangeId, range: AddrRange },
    ReleaseFailed { id: RangeId, reason: Error },
    /// Answer to a status query; `report` is `None` for an unknown id.
    Status { id: RangeId, report: Option<RangeReport> },
    /// The block was lost to a peer with precedence.
    Yielded {
        id: RangeId,
        range: AddrRange,
        peer: PeerClaim,
    },
}

/// Queue entry pairing an event with the command originator it concerns.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub sender: SenderToken,
    pub notify: Notify,
}
