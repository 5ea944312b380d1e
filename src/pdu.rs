//! The format of MAAP PDUs, providing encoding and decoding
//!
//! Contains the frame layout defined in IEEE 1722-2016, B.2.
//!
//! A MAAP PDU is a fixed 42-byte Ethernet frame:
//!
//! ```norust
//!  6    | 6   | 2         | 1       | 1                    | 2
//!  dest | src | ethertype | subtype | sv|version|mtype     | mver|data_len
//!
//!  8         | 6               | 2               | 6              | 2
//!  stream_id | requested_start | requested_count | conflict_start | conflict_count
//! ```
//!
//! All multi-byte fields are big-endian. `dest` is always the MAAP
//! multicast address, `ethertype` 0x22F0, `subtype` 0xFE, and
//! `maap_data_length` 16 (the bytes following the stream ID).

use crate::parameters::{
    AVTP_ETHERTYPE, MAAP_DATA_LENGTH, MAAP_DEST_MAC, MAAP_FRAME_LEN, MAAP_SUBTYPE,
};
use crate::{AddrRange, MacAddr};
use modular_bitfield::prelude::*;

/// message_type values (IEEE 1722-2016 Table B.1).
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Claim being tested for conflicts.
    Probe = 1,
    /// Assertion of ownership against a conflicting claim.
    Defend = 2,
    /// Periodic reaffirmation of a held claim.
    Announce = 3,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownMessageType {
    pub value: u8,
}

impl TryFrom<u8> for MessageType {
    type Error = UnknownMessageType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => MessageType::Probe,
            2 => MessageType::Defend,
            3 => MessageType::Announce,
            _ => return Err(UnknownMessageType { value }),
        })
    }
}

/// Byte following the subtype: SV(1) | version(3) | message_type(4), MSB
/// first on the wire, so declared low-bit first here.
///
/// MAAP is a control PDU; the stream-valid bit and AVTP version are both
/// zero in every conforming frame.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct SubtypeData {
    pub message_type: B4,
    pub version: B3,
    pub sv: bool,
}

/// maap_version(5) | maap_data_length(11), one big-endian word.
#[bitfield]
#[derive(Debug, Clone, Copy)]
pub struct VersionDataLength {
    pub maap_data_length: B11,
    pub maap_version: B5,
}

/// Frames addressed to MAAP that do not parse.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    SmallerThanMinSize { have: usize, need: usize },
    WrongSubtype { subtype: u8 },
    UnsupportedVersion { sv: bool, version: u8 },
    DataLengthMismatch { have: u16, need: u16 },
    UnknownMessageType { value: u8 },
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not MAAP's business: foreign ethertype or destination,
    /// or too short to tell. Hosts dispatch these elsewhere.
    NotMaap,
    /// The frame is addressed to MAAP but does not parse. Dropped.
    Malformed(Malformed),
}

impl From<Malformed> for DecodeError {
    fn from(other: Malformed) -> Self {
        DecodeError::Malformed(other)
    }
}

/// One decoded MAAP PDU.
///
/// `conflict` has `count == 0` when the message carries no conflict payload
/// (probes and announcements).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaapPdu {
    pub src: MacAddr,
    pub message_type: MessageType,
    pub stream_id: u64,
    pub requested: AddrRange,
    pub conflict: AddrRange,
}

const NO_CONFLICT: AddrRange = AddrRange {
    start: MacAddr([0; 6]),
    count: 0,
};

impl MaapPdu {
    pub fn probe(src: MacAddr, stream_id: u64, requested: AddrRange) -> Self {
        Self {
            src,
            message_type: MessageType::Probe,
            stream_id,
            requested,
            conflict: NO_CONFLICT,
        }
    }

    pub fn announce(src: MacAddr, stream_id: u64, requested: AddrRange) -> Self {
        Self {
            src,
            message_type: MessageType::Announce,
            stream_id,
            requested,
            conflict: NO_CONFLICT,
        }
    }

    /// Defend `requested`, naming the contested sub-range in `conflict`.
    pub fn defend(src: MacAddr, stream_id: u64, requested: AddrRange, conflict: AddrRange) -> Self {
        Self {
            src,
            message_type: MessageType::Defend,
            stream_id,
            requested,
            conflict,
        }
    }

    /// Classify and decode a received Ethernet frame.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() < 14 {
            return Err(DecodeError::NotMaap);
        }
        let ethertype = u16::from_be_bytes(frame[12..14].try_into().unwrap());
        if ethertype != AVTP_ETHERTYPE || frame[0..6] != MAAP_DEST_MAC.0 {
            return Err(DecodeError::NotMaap);
        }

        let have = frame.len();
        if have < MAAP_FRAME_LEN {
            return Err(Malformed::SmallerThanMinSize {
                have,
                need: MAAP_FRAME_LEN,
            }
            .into());
        }

        let subtype = frame[14];
        if subtype != MAAP_SUBTYPE {
            return Err(Malformed::WrongSubtype { subtype }.into());
        }

        let sd = SubtypeData::from_bytes([frame[15]]);
        if sd.sv() || sd.version() != 0 {
            return Err(Malformed::UnsupportedVersion {
                sv: sd.sv(),
                version: sd.version(),
            }
            .into());
        }

        let vdl_word = u16::from_be_bytes(frame[16..18].try_into().unwrap());
        let vdl = VersionDataLength::from_bytes(vdl_word.to_le_bytes());
        if vdl.maap_data_length() != MAAP_DATA_LENGTH {
            return Err(Malformed::DataLengthMismatch {
                have: vdl.maap_data_length(),
                need: MAAP_DATA_LENGTH,
            }
            .into());
        }

        let message_type = MessageType::try_from(sd.message_type())
            .map_err(|e| Malformed::UnknownMessageType { value: e.value })?;

        Ok(Self {
            src: MacAddr(frame[6..12].try_into().unwrap()),
            message_type,
            stream_id: u64::from_be_bytes(frame[18..26].try_into().unwrap()),
            requested: AddrRange {
                start: MacAddr(frame[26..32].try_into().unwrap()),
                count: u16::from_be_bytes(frame[32..34].try_into().unwrap()),
            },
            conflict: AddrRange {
                start: MacAddr(frame[34..40].try_into().unwrap()),
                count: u16::from_be_bytes(frame[40..42].try_into().unwrap()),
            },
        })
    }

    /// Serialize into a complete Ethernet frame.
    pub fn encode(&self) -> [u8; MAAP_FRAME_LEN] {
        let mut f = [0u8; MAAP_FRAME_LEN];
        f[0..6].copy_from_slice(&MAAP_DEST_MAC.0);
        f[6..12].copy_from_slice(&self.src.0);
        f[12..14].copy_from_slice(&AVTP_ETHERTYPE.to_be_bytes());
        f[14] = MAAP_SUBTYPE;
        f[15] = SubtypeData::new()
            .with_message_type(self.message_type as u8)
            .into_bytes()[0];
        let vdl = VersionDataLength::new().with_maap_data_length(MAAP_DATA_LENGTH);
        f[16..18].copy_from_slice(&u16::from_le_bytes(vdl.into_bytes()).to_be_bytes());
        f[18..26].copy_from_slice(&self.stream_id.to_be_bytes());
        f[26..32].copy_from_slice(&self.requested.start.0);
        f[32..34].copy_from_slice(&self.requested.count.to_be_bytes());
        f[34..40].copy_from_slice(&self.conflict.start.0);
        f[40..42].copy_from_slice(&self.conflict.count.to_be_bytes());
        f
    }
}
