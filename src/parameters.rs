//! Protocol constants from IEEE 1722-2016 Annex B.

use crate::MacAddr;

/// Destination MAC carried by every MAAP PDU.
pub const MAAP_DEST_MAC: MacAddr = MacAddr([0x91, 0xE0, 0xF0, 0x00, 0xFF, 0x00]);

/// AVTP ethertype.
pub const AVTP_ETHERTYPE: u16 = 0x22F0;

/// AVTP subtype identifying a MAAP PDU.
pub const MAAP_SUBTYPE: u8 = 0xFE;

/// Size of a MAAP PDU on the wire, layer-2 headers included.
pub const MAAP_FRAME_LEN: usize = 42;

/// Value of the maap_data_length field for the fixed-size PDU body.
pub const MAAP_DATA_LENGTH: u16 = 16;

/// First address of the dynamic allocation pool.
pub const DYNAMIC_POOL_BASE: MacAddr = MacAddr([0x91, 0xE0, 0xF0, 0x00, 0x00, 0x00]);

/// Addresses in the dynamic allocation pool: `91:E0:F0:00:00:00` through
/// `91:E0:F0:00:FD:FF`.
pub const DYNAMIC_POOL_SIZE: u32 = 0xFE00;

/// Probes remaining after the initial one before a claim is considered won.
pub const MAAP_PROBE_RETRANSMITS: u8 = 3;

/// Base delay between probes, milliseconds.
pub const MAAP_PROBE_INTERVAL_BASE: u32 = 500;

/// Uniform jitter added to the probe delay, milliseconds.
pub const MAAP_PROBE_INTERVAL_VARIATION: u32 = 100;

/// Base delay between announcements of a held claim, milliseconds.
pub const MAAP_ANNOUNCE_INTERVAL_BASE: u32 = 30_000;

/// Uniform jitter added to the announce delay, milliseconds.
pub const MAAP_ANNOUNCE_INTERVAL_VARIATION: u32 = 2_000;

/// Random placements tried before a reservation reports no free range.
pub const FIND_FREE_TRIES: u32 = 100;

/// Upper bound on reservations tracked by one engine. Annex B workloads are
/// a handful of claims per talker; the bound exists to keep the engine
/// allocation-free.
pub const MAX_RANGES: usize = 16;

/// Depth of the pending-notification queue.
pub const NOTIFY_DEPTH: usize = 32;
