//! The MAAP protocol engine.
//!
//! One engine instance binds one interface. The host drives it through
//! three entry points (commands, [`MaapClient::handle_packet`],
//! [`MaapClient::handle_timer`]) plus the
//! [`MaapClient::delay_to_next_timer`] query, and drains the notification
//! queue after each call. No entry point blocks; the clock is supplied by
//! the caller on every time-sensitive call so hosts and tests control it.

use core::cmp::Ordering;

use embedded_time::duration::{Milliseconds, Nanoseconds};
use embedded_time::{Clock, Instant};
use heapless::{Deque, Vec};
use rand_core::RngCore;

use crate::intervals::{Interval, IntervalSet};
use crate::notify::{Notification, Notify, PeerClaim, RangeReport};
use crate::parameters::{
    MAAP_ANNOUNCE_INTERVAL_BASE, MAAP_ANNOUNCE_INTERVAL_VARIATION, MAAP_FRAME_LEN,
    MAAP_PROBE_INTERVAL_BASE, MAAP_PROBE_INTERVAL_VARIATION, MAAP_PROBE_RETRANSMITS, MAX_RANGES,
    NOTIFY_DEPTH,
};
use crate::pdu::{DecodeError, MaapPdu, MessageType};
use crate::timers::TimerQueue;
use crate::{AddrRange, Error, MacAddr, RangeId, RangeState, SenderToken};

/// The frame could not be handed to the interface.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError;

/// Raw-frame egress, one implementation per bound interface. Frames are
/// complete Ethernet frames including L2 headers.
pub trait FrameSender {
    fn send_frame(&mut self, frame: &[u8; MAAP_FRAME_LEN]) -> Result<(), SendError>;
}

#[derive(Debug, Clone, Copy)]
struct Pool {
    base: MacAddr,
    count: u32,
}

/// Reservation state. `Released` has no variant here: a released
/// reservation is removed from every structure in the same call that
/// reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Probing,
    Defending,
}

struct Reservation {
    id: RangeId,
    sender: SenderToken,
    state: State,
    /// Probes left while probing; zero once defending.
    counter: u8,
    range: AddrRange,
}

pub struct MaapClient<C, R, S>
where
    C: Clock,
    R: RngCore,
    S: FrameSender,
{
    src_mac: MacAddr,
    pool: Option<Pool>,
    reservations: Vec<Reservation, MAX_RANGES>,
    intervals: IntervalSet,
    timers: TimerQueue<C>,
    pending: Deque<Notification, NOTIFY_DEPTH>,
    next_id: RangeId,
    rng: R,
    net: S,
}

impl<C, R, S> MaapClient<C, R, S>
where
    C: Clock<T = u64>,
    R: RngCore,
    S: FrameSender,
{
    /// Engine for one interface transmitting as `src_mac`.
    pub fn new(src_mac: MacAddr, rng: R, net: S) -> Self {
        Self {
            src_mac,
            pool: None,
            reservations: Vec::new(),
            intervals: IntervalSet::new(),
            timers: TimerQueue::new(),
            pending: Deque::new(),
            next_id: 1,
            rng,
            net,
        }
    }

    /// The stream ID this engine claims with: the source MAC zero-extended
    /// to 64 bits. Doubles as the arbitration key (lower wins).
    pub fn stream_id(&self) -> u64 {
        self.src_mac.to_u64()
    }

    pub fn initialized(&self) -> bool {
        self.pool.is_some()
    }

    /// The owned egress, e.g. for host teardown or test inspection.
    pub fn net_mut(&mut self) -> &mut S {
        &mut self.net
    }

    /// Oldest undelivered notification, if any.
    pub fn pop_notification(&mut self) -> Option<Notification> {
        self.pending.pop_front()
    }

    /// Configure the allocation pool. Fails while a pool is configured;
    /// [`Self::deinit_client`] first.
    pub fn init_client(&mut self, sender: SenderToken, base: MacAddr, count: u32) {
        if self.pool.is_some() {
            self.notify(
                sender,
                Notify::InitFailed {
                    reason: Error::AlreadyInitialized,
                },
            );
            return;
        }
        let end = base.to_u64() + u64::from(count);
        if count == 0 || end > 1 << 48 {
            self.notify(
                sender,
                Notify::InitFailed {
                    reason: Error::InvalidPool,
                },
            );
            return;
        }
        self.pool = Some(Pool { base, count });
        maap_debug!("maap pool configured, {} addresses", count);
        self.notify(sender, Notify::Initialized { base, count });
    }

    /// Drop every claim and return to the unconfigured state. Pending
    /// notifications stay queued for the host to drain.
    pub fn deinit_client(&mut self) {
        self.pool = None;
        self.reservations.clear();
        self.intervals.clear();
        self.timers.clear();
    }

    /// Claim `length` consecutive addresses somewhere in the pool.
    ///
    /// On acceptance the first probe goes out immediately and the id is
    /// returned; the claim is usable once `Acquired` arrives. All failures
    /// surface as a `ReserveFailed` notification.
    pub fn reserve_range(
        &mut self,
        sender: SenderToken,
        length: u32,
        now: Instant<C>,
    ) -> Option<RangeId> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => {
                self.reserve_failed(sender, length, Error::NotInitialized);
                return None;
            }
        };
        if length == 0 || length > 0xFFFF {
            self.reserve_failed(sender, length, Error::InvalidLength);
            return None;
        }
        if self.reservations.is_full() {
            self.reserve_failed(sender, length, Error::TableFull);
            return None;
        }
        let range = match self.intervals.find_free(
            pool.base.to_u64(),
            pool.count,
            length as u16,
            &mut self.rng,
        ) {
            Some(range) => range,
            None => {
                self.reserve_failed(sender, length, Error::NoFreeRange);
                return None;
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        if self.intervals.insert(Interval { range, owner: id }).is_err() {
            self.reserve_failed(sender, length, Error::TableFull);
            return None;
        }
        let reservation = Reservation {
            id,
            sender,
            state: State::Probing,
            counter: MAAP_PROBE_RETRANSMITS,
            range,
        };
        if self.reservations.push(reservation).is_err() {
            self.intervals.remove(id);
            self.reserve_failed(sender, length, Error::TableFull);
            return None;
        }

        // first retransmit is due within the jitter window
        let deadline = self.schedule(now, 0, MAAP_PROBE_INTERVAL_VARIATION);
        self.timers.push(id, deadline);
        self.send_pdu(&MaapPdu::probe(self.src_mac, self.stream_id(), range));
        maap_debug!("probing {} addresses as range {}", length, id);
        self.notify(sender, Notify::Acquiring { id, range });
        Some(id)
    }

    /// Give up a claim. Succeeds for a reservation owned by `sender` in any
    /// live state; probing claims are abandoned without an `Acquired`.
    pub fn release_range(&mut self, sender: SenderToken, id: RangeId) {
        let at = self
            .position_by_id(id)
            .filter(|&at| self.reservations[at].sender == sender);
        match at {
            Some(at) => {
                let reservation = self.remove_reservation(at);
                maap_debug!("range {} released", id);
                self.notify(
                    sender,
                    Notify::Released {
                        id,
                        range: reservation.range,
                    },
                );
            }
            None => self.notify(
                sender,
                Notify::ReleaseFailed {
                    id,
                    reason: Error::UnknownId,
                },
            ),
        }
    }

    /// Report a claim's current block and state; answers with an empty
    /// report for an unknown (or already released) id.
    pub fn range_status(&mut self, sender: SenderToken, id: RangeId) {
        let report = self
            .reservations
            .iter()
            .find(|r| r.id == id)
            .map(|r| RangeReport {
                range: r.range,
                state: match r.state {
                    State::Probing => RangeState::Probing,
                    State::Defending => RangeState::Defending,
                },
            });
        self.notify(sender, Notify::Status { id, report });
    }

    /// Feed one received Ethernet frame to the engine.
    ///
    /// Returns `false` for frames that are not MAAP's business so the host
    /// can dispatch them elsewhere, `true` otherwise (malformed MAAP frames
    /// are dropped, own transmissions ignored). A single PDU may conflict
    /// with several local claims; each is arbitrated independently.
    pub fn handle_packet(&mut self, frame: &[u8]) -> bool {
        let pdu = match MaapPdu::decode(frame) {
            Ok(pdu) => pdu,
            Err(DecodeError::NotMaap) => return false,
            Err(DecodeError::Malformed(_)) => {
                maap_trace!("dropping malformed maap pdu, {} bytes", frame.len());
                return true;
            }
        };
        if pdu.src == self.src_mac {
            return true;
        }

        // A defend names the contested sub-range in its conflict fields;
        // everything else claims its requested fields.
        let window = match pdu.message_type {
            MessageType::Defend if pdu.conflict.count != 0 => pdu.conflict,
            _ => pdu.requested,
        };
        if window.count == 0 {
            return true;
        }

        // conflict handling mutates the tables, so collect the hits first
        let mut hits: Vec<RangeId, MAX_RANGES> = Vec::new();
        for iv in self.intervals.overlapping(&window) {
            let _ = hits.push(iv.owner);
        }
        for id in hits {
            if let Some(at) = self.position_by_id(id) {
                self.arbitrate(at, &pdu, &window);
            }
        }
        true
    }

    /// Process every scheduled action due at or before `now`, in deadline
    /// order.
    pub fn handle_timer(&mut self, now: Instant<C>) {
        while let Some(entry) = self.timers.pop_expired(now) {
            let at = match self.position_by_id(entry.id) {
                Some(at) => at,
                None => continue,
            };
            match self.reservations[at].state {
                State::Probing => {
                    if self.reservations[at].counter > 0 {
                        self.reservations[at].counter -= 1;
                        let range = self.reservations[at].range;
                        let deadline = self.schedule(
                            now,
                            MAAP_PROBE_INTERVAL_BASE,
                            MAAP_PROBE_INTERVAL_VARIATION,
                        );
                        self.timers.push(entry.id, deadline);
                        self.send_pdu(&MaapPdu::probe(self.src_mac, self.stream_id(), range));
                    } else {
                        let (range, sender) = {
                            let reservation = &mut self.reservations[at];
                            reservation.state = State::Defending;
                            (reservation.range, reservation.sender)
                        };
                        let deadline = self.schedule(
                            now,
                            MAAP_ANNOUNCE_INTERVAL_BASE,
                            MAAP_ANNOUNCE_INTERVAL_VARIATION,
                        );
                        self.timers.push(entry.id, deadline);
                        self.send_pdu(&MaapPdu::announce(self.src_mac, self.stream_id(), range));
                        maap_debug!("range {} acquired", entry.id);
                        self.notify(sender, Notify::Acquired { id: entry.id, range });
                    }
                }
                State::Defending => {
                    let range = self.reservations[at].range;
                    let deadline = self.schedule(
                        now,
                        MAAP_ANNOUNCE_INTERVAL_BASE,
                        MAAP_ANNOUNCE_INTERVAL_VARIATION,
                    );
                    self.timers.push(entry.id, deadline);
                    self.send_pdu(&MaapPdu::announce(self.src_mac, self.stream_id(), range));
                }
            }
        }
    }

    /// Time until the next scheduled action, `None` when idle. Hosts fold
    /// this into their poll/sleep deadline.
    pub fn delay_to_next_timer(&self, now: Instant<C>) -> Option<Nanoseconds<u64>> {
        self.timers.delay_to_head(now)
    }

    /// Arbitrate one conflicting PDU against the reservation at `at`.
    fn arbitrate(&mut self, at: usize, pdu: &MaapPdu, window: &AddrRange) {
        match (self.reservations[at].state, pdu.message_type) {
            // probe against probe, or announce against a held claim:
            // numeric stream-ID comparison, lower wins
            (State::Probing, MessageType::Probe) | (State::Defending, MessageType::Announce) => {
                match self.stream_id().cmp(&pdu.stream_id) {
                    Ordering::Less => self.defend(at, window),
                    Ordering::Greater => self.yield_range(at, pdu),
                    // our own traffic reflected back; nothing to arbitrate
                    Ordering::Equal => {}
                }
            }
            (State::Defending, MessageType::Probe) => self.defend(at, window),
            // a probe cannot stand against an established claim, and a
            // defend aimed at us always wins
            (State::Probing, _) | (State::Defending, MessageType::Defend) => {
                self.yield_range(at, pdu)
            }
        }
    }

    /// Assert ownership of the block at `at`, naming the contested
    /// sub-range.
    fn defend(&mut self, at: usize, window: &AddrRange) {
        let range = self.reservations[at].range;
        let (range_last, window_last) = match (range.last(), window.last()) {
            (Some(r), Some(w)) => (r, w),
            _ => return,
        };
        let lo = range.first().max(window.first());
        let hi = range_last.min(window_last);
        let conflict = AddrRange {
            start: MacAddr::from_u64(lo),
            count: (hi - lo + 1) as u16,
        };
        maap_debug!("defending range {}", self.reservations[at].id);
        self.send_pdu(&MaapPdu::defend(
            self.src_mac,
            self.stream_id(),
            range,
            conflict,
        ));
    }

    /// Arbitration lost: drop the claim and tell its owner who took it.
    fn yield_range(&mut self, at: usize, pdu: &MaapPdu) {
        let reservation = self.remove_reservation(at);
        maap_debug!("range {} yielded", reservation.id);
        self.notify(
            reservation.sender,
            Notify::Yielded {
                id: reservation.id,
                range: reservation.range,
                peer: PeerClaim {
                    stream_id: pdu.stream_id,
                    range: pdu.requested,
                },
            },
        );
    }

    fn position_by_id(&self, id: RangeId) -> Option<usize> {
        self.reservations.iter().position(|r| r.id == id)
    }

    /// Remove a reservation from every structure in one step; nothing of it
    /// is observable afterwards.
    fn remove_reservation(&mut self, at: usize) -> Reservation {
        let reservation = self.reservations.remove(at);
        self.intervals.remove(reservation.id);
        self.timers.remove(reservation.id);
        reservation
    }

    /// `base + uniform(variation)` milliseconds past `now`.
    fn schedule(&mut self, now: Instant<C>, base_ms: u32, variation_ms: u32) -> Instant<C> {
        let jitter = self.rng.next_u32() % variation_ms;
        now + Milliseconds(base_ms + jitter)
    }

    fn send_pdu(&mut self, pdu: &MaapPdu) {
        if self.net.send_frame(&pdu.encode()).is_err() {
            // lost transmission; the next scheduled action retransmits
            maap_warn!("frame send failed");
        }
    }

    fn reserve_failed(&mut self, sender: SenderToken, length: u32, reason: Error) {
        self.notify(sender, Notify::ReserveFailed { length, reason });
    }

    fn notify(&mut self, sender: SenderToken, notify: Notify) {
        if self
            .pending
            .push_back(Notification { sender, notify })
            .is_err()
        {
            maap_warn!("notification queue full, event dropped");
        }
    }
}
