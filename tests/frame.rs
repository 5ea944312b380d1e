use maap::parameters::{MAAP_DEST_MAC, MAAP_FRAME_LEN};
use maap::pdu::{DecodeError, Malformed, MaapPdu, MessageType};
use maap::{AddrRange, MacAddr};

/// IEEE 1722-2016 Figure B.1 layout:
///
/// 91 E0 F0 00 FF 00 | 00 1B 21 AA BB CC | 22 F0 | FE | 01 | 00 10
/// 00 00 00 1B 21 AA BB CC | 91 E0 F0 00 0A 00 | 00 08 | 00*6 | 00 00
///
/// Field | dest | src | ethertype | subtype | sv,ver,mtype | mver,len
///       | stream_id | req_start | req_count | conflict_start | conflict_count
const PROBE: &str = "91e0f000ff00001b21aabbcc22f0fe0100100000001b21aabbcc91e0f0000a0000080000000000000000";

const ANNOUNCE: &str =
    "91e0f000ff00001b21aabbcc22f0fe0300100000001b21aabbcc91e0f0000a0000080000000000000000";

/// Defend for 91:E0:F0:00:0A:00 + 16, naming the contested pair at
/// 91:E0:F0:00:0A:04 + 2.
const DEFEND: &str =
    "91e0f000ff00001b2100000122f0fe0200100000001b2100000191e0f0000a00001091e0f0000a040002";

#[test]
fn probe_fields() {
    let buf = hex::decode(PROBE).unwrap();
    assert_eq!(buf.len(), MAAP_FRAME_LEN);

    let pdu = MaapPdu::decode(&buf).unwrap();
    assert_eq!(pdu.message_type, MessageType::Probe);
    assert_eq!(pdu.src, MacAddr([0x00, 0x1B, 0x21, 0xAA, 0xBB, 0xCC]));
    assert_eq!(pdu.stream_id, 0x00_00_00_1B_21_AA_BB_CC);
    assert_eq!(
        pdu.requested,
        AddrRange::new(MacAddr([0x91, 0xE0, 0xF0, 0x00, 0x0A, 0x00]), 8)
    );
    assert_eq!(pdu.conflict.count, 0);
}

#[test]
fn announce_fields() {
    let buf = hex::decode(ANNOUNCE).unwrap();
    let pdu = MaapPdu::decode(&buf).unwrap();
    assert_eq!(pdu.message_type, MessageType::Announce);
    assert_eq!(pdu.requested.count, 8);
}

#[test]
fn defend_fields() {
    let buf = hex::decode(DEFEND).unwrap();
    let pdu = MaapPdu::decode(&buf).unwrap();
    assert_eq!(pdu.message_type, MessageType::Defend);
    assert_eq!(pdu.stream_id, 0x00_00_00_1B_21_00_00_01);
    assert_eq!(
        pdu.requested,
        AddrRange::new(MacAddr([0x91, 0xE0, 0xF0, 0x00, 0x0A, 0x00]), 16)
    );
    assert_eq!(
        pdu.conflict,
        AddrRange::new(MacAddr([0x91, 0xE0, 0xF0, 0x00, 0x0A, 0x04]), 2)
    );
}

#[test]
fn encode_decode_round_trip() {
    let src = MacAddr([0x00, 0x1B, 0x21, 0xAA, 0xBB, 0xCC]);
    let requested = AddrRange::new(MacAddr([0x91, 0xE0, 0xF0, 0x00, 0x00, 0x40]), 0x1234);
    let conflict = AddrRange::new(MacAddr([0x91, 0xE0, 0xF0, 0x00, 0x00, 0x48]), 1);

    for pdu in [
        MaapPdu::probe(src, src.to_u64(), requested),
        MaapPdu::announce(src, src.to_u64(), requested),
        MaapPdu::defend(src, src.to_u64(), requested, conflict),
    ] {
        assert_eq!(MaapPdu::decode(&pdu.encode()).unwrap(), pdu);
    }
}

#[test]
fn decode_encode_round_trip() {
    for vector in [PROBE, ANNOUNCE, DEFEND] {
        let buf = hex::decode(vector).unwrap();
        let pdu = MaapPdu::decode(&buf).unwrap();
        assert_eq!(&pdu.encode()[..], &buf[..]);
    }
}

#[test]
fn encoded_frames_carry_the_maap_multicast_dest() {
    let src = MacAddr([2, 0, 0, 0, 0, 1]);
    let pdu = MaapPdu::probe(src, src.to_u64(), AddrRange::new(MacAddr([0; 6]), 1));
    assert_eq!(&pdu.encode()[0..6], &MAAP_DEST_MAC.0);
}

#[test]
fn foreign_frames_are_not_maap() {
    let mut buf = hex::decode(PROBE).unwrap();

    // too short to even carry an ethertype
    assert_eq!(MaapPdu::decode(&buf[..10]), Err(DecodeError::NotMaap));

    // IPv4 ethertype
    buf[12] = 0x08;
    buf[13] = 0x00;
    assert_eq!(MaapPdu::decode(&buf), Err(DecodeError::NotMaap));

    // right ethertype, wrong destination
    let mut buf = hex::decode(PROBE).unwrap();
    buf[0] = 0x92;
    assert_eq!(MaapPdu::decode(&buf), Err(DecodeError::NotMaap));
}

#[test]
fn malformed_frames_are_rejected_with_context() {
    let buf = hex::decode(PROBE).unwrap();

    assert_eq!(
        MaapPdu::decode(&buf[..41]),
        Err(DecodeError::Malformed(Malformed::SmallerThanMinSize {
            have: 41,
            need: 42
        }))
    );

    let mut t = buf.clone();
    t[14] = 0x7F;
    assert_eq!(
        MaapPdu::decode(&t),
        Err(DecodeError::Malformed(Malformed::WrongSubtype {
            subtype: 0x7F
        }))
    );

    let mut t = buf.clone();
    t[15] = 0x81; // sv bit set
    assert_eq!(
        MaapPdu::decode(&t),
        Err(DecodeError::Malformed(Malformed::UnsupportedVersion {
            sv: true,
            version: 0
        }))
    );

    let mut t = buf.clone();
    t[15] = 0x11; // version 1
    assert_eq!(
        MaapPdu::decode(&t),
        Err(DecodeError::Malformed(Malformed::UnsupportedVersion {
            sv: false,
            version: 1
        }))
    );

    let mut t = buf.clone();
    t[17] = 0x0F; // maap_data_length 15
    assert_eq!(
        MaapPdu::decode(&t),
        Err(DecodeError::Malformed(Malformed::DataLengthMismatch {
            have: 15,
            need: 16
        }))
    );

    for value in [0u8, 4, 15] {
        let mut t = buf.clone();
        t[15] = value;
        assert_eq!(
            MaapPdu::decode(&t),
            Err(DecodeError::Malformed(Malformed::UnknownMessageType {
                value
            }))
        );
    }
}
