//! Bookkeeping of claimed blocks within the allocation pool.
//!
//! The set holds every block this engine is probing or defending, ordered
//! by start address. Peers' claims are never stored; the engine arbitrates
//! those per packet.

use crate::parameters::{FIND_FREE_TRIES, MAX_RANGES};
use crate::{AddrRange, MacAddr, RangeId};
use heapless::Vec;
use rand_core::RngCore;

/// One stored claim: the block plus the reservation that owns it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub range: AddrRange,
    pub owner: RangeId,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// The new block shares addresses with a stored one.
    Overlap { with: RangeId },
    /// Claim table at capacity.
    Full,
}

/// Set of claimed blocks ordered by start address.
///
/// Stored blocks are pairwise disjoint (`insert` rejects overlap), which
/// also makes them sorted by last address.
#[derive(Debug, Default)]
pub struct IntervalSet {
    entries: Vec<Interval, MAX_RANGES>,
}

impl IntervalSet {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate stored blocks sharing at least one address with `range`.
    /// Empty query blocks overlap nothing.
    pub fn overlapping<'a>(&'a self, range: &AddrRange) -> impl Iterator<Item = &'a Interval> {
        let query = *range;
        self.entries
            .iter()
            .take_while(move |e| query.last().map_or(false, |last| e.range.first() <= last))
            .filter(move |e| e.range.overlaps(&query))
    }

    /// Does any stored block intersect `range`?
    pub fn overlaps(&self, range: &AddrRange) -> bool {
        self.overlapping(range).next().is_some()
    }

    /// Store a claim. Overlap with any stored claim is rejected; local
    /// claims must stay disjoint.
    pub fn insert(&mut self, iv: Interval) -> Result<(), InsertError> {
        if let Some(hit) = self.overlapping(&iv.range).next() {
            return Err(InsertError::Overlap { with: hit.owner });
        }
        let at = self
            .entries
            .partition_point(|e| e.range.first() <= iv.range.first());
        self.entries.insert(at, iv).map_err(|_| InsertError::Full)
    }

    /// Drop the claim owned by `owner`, returning it if present.
    pub fn remove(&mut self, owner: RangeId) -> Option<Interval> {
        let at = self.entries.iter().position(|e| e.owner == owner)?;
        Some(self.entries.remove(at))
    }

    /// Pick a free block of `length` addresses inside the pool at random.
    ///
    /// Draws a uniform start offset and rejects it on overlap, up to
    /// [`FIND_FREE_TRIES`] draws.
    pub fn find_free<R: RngCore>(
        &self,
        pool_base: u64,
        pool_len: u32,
        length: u16,
        rng: &mut R,
    ) -> Option<AddrRange> {
        if length == 0 || u32::from(length) > pool_len {
            return None;
        }
        let positions = pool_len - u32::from(length) + 1;
        for _ in 0..FIND_FREE_TRIES {
            let offset = rng.next_u32() % positions;
            let candidate = AddrRange {
                start: MacAddr::from_u64(pool_base + u64::from(offset)),
                count: length,
            };
            if !self.overlaps(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
