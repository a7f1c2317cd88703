//! Wire-format definitions for protocol datagrams.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated or corrupted input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Packet Number                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |Flags  |        Checksum       |          Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 14 bytes.
//! seq(4) + ack(4) + pkt_num(4) + flags-and-checksum(2)
//!
//! The final 16-bit word packs four independent flag bits into its high
//! nibble and a 12-bit CRC into its low 12 bits.  The CRC is computed over
//! the full frame (header + payload) with the checksum bits zeroed, so the
//! flag bits are covered by the checksum while the checksum itself is not.

/// Bit-flag constants for the high nibble of the flags-and-checksum word.
pub mod flags {
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u16 = 0x8000;
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 0x4000;
    /// Finish — sender has no more data to send.
    pub const FIN: u16 = 0x2000;
    /// Segment carries application data.
    pub const DATA: u16 = 0x1000;
    /// All flag bits; the complement is the checksum field.
    pub const MASK: u16 = 0xF000;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 14;

/// The low 12 bits of the flags-and-checksum word hold the CRC.
pub const CHECKSUM_MASK: u16 = 0x0FFF;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_PKT_NUM: usize = 8;
const OFF_FLAGS: usize = 12;

// CRC parameters: CCITT polynomial, all-ones initial register.
const CRC_POLY: u16 = 0x1021;
const CRC_INIT: u16 = 0xFFFF;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to big-endian
/// on the wire and [`Packet::decode`] converts back.  `flags` holds only the
/// flag bits — the checksum is computed on encode and verified (then
/// stripped) on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Byte offset of the first payload byte; 0 for control packets.
    pub seq: u32,
    /// Next expected byte offset from the peer; 0 when unused.
    pub ack: u32,
    /// Sender-local monotonically increasing index, for logging and the RTT
    /// report only; 0 for control packets.  Not protocol-relevant.
    pub pkt_num: u32,
    /// Bitmask of [`flags`] constants (high-nibble bits only).
    pub flags: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a control packet (SYN / ACK / FIN): `pkt_num = 0`, no payload.
    pub fn control(seq: u32, ack: u32, flags: u16) -> Self {
        Self {
            header: Header {
                seq,
                ack,
                pkt_num: 0,
                flags,
            },
            payload: Vec::new(),
        }
    }

    /// Build a data packet: `seq` is the window offset of the first payload
    /// byte, `pkt_num` the sender-local packet index.
    pub fn data(seq: u32, pkt_num: u32, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                seq,
                ack: 0,
                pkt_num,
                flags: flags::DATA,
            },
            payload,
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// The checksum is computed over the serialised frame with the checksum
    /// bits zeroed, then OR-ed into the flags word.  Any checksum bits
    /// present in `header.flags` are ignored.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.header.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.header.ack.to_be_bytes());
        buf[OFF_PKT_NUM..OFF_PKT_NUM + 4].copy_from_slice(&self.header.pkt_num.to_be_bytes());

        // Flags only; checksum bits stay zero while the CRC is computed.
        let flag_bits = self.header.flags & flags::MASK;
        buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&flag_bits.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = crc12(&buf);
        buf[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&(flag_bits | csum).to_be_bytes());

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the embedded checksum does not match the CRC recomputed over the
    ///   frame with the checksum bits zeroed.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::TooShort);
        }

        let seq = u32::from_be_bytes(buf[OFF_SEQ..OFF_SEQ + 4].try_into().unwrap());
        let ack = u32::from_be_bytes(buf[OFF_ACK..OFF_ACK + 4].try_into().unwrap());
        let pkt_num = u32::from_be_bytes(buf[OFF_PKT_NUM..OFF_PKT_NUM + 4].try_into().unwrap());
        let word = u16::from_be_bytes(buf[OFF_FLAGS..OFF_FLAGS + 2].try_into().unwrap());
        let flag_bits = word & flags::MASK;
        let received_csum = word & CHECKSUM_MASK;

        // Verify: zero the checksum bits, recompute, compare.
        let mut scratch = buf.to_vec();
        scratch[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&flag_bits.to_be_bytes());
        if crc12(&scratch) != received_csum {
            return Err(PacketError::ChecksumMismatch);
        }

        Ok(Packet {
            header: Header {
                seq,
                ack,
                pkt_num,
                flags: flag_bits,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    TooShort,
    /// Embedded checksum did not match the recomputed value.
    ChecksumMismatch,
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::TooShort => write!(f, "buffer too short to contain a header"),
            PacketError::ChecksumMismatch => write!(f, "checksum verification failed"),
        }
    }
}

impl std::error::Error for PacketError {}

/// Compute the 12-bit CRC over `data`.
///
/// CCITT-style bitwise CRC: for each byte, XOR it into the high byte of a
/// 16-bit register, then shift left eight times, XOR-ing in the polynomial
/// whenever the top bit falls out.  The final register is masked to its low
/// 12 bits.  The caller must zero the checksum bits within `data` before
/// calling this function.
fn crc12(data: &[u8]) -> u16 {
    let mut crc = CRC_INIT;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc & CHECKSUM_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(seq: u32, ack: u32, pkt_num: u32, flags: u16, payload: &[u8]) -> Packet {
        Packet {
            header: Header {
                seq,
                ack,
                pkt_num,
                flags,
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = make_packet(42, 7, 3, flags::DATA, b"hello");
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded.header.seq, 42);
        assert_eq!(decoded.header.ack, 7);
        assert_eq!(decoded.header.pkt_num, 3);
        assert_eq!(decoded.header.flags, flags::DATA);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn empty_payload_roundtrip() {
        let pkt = Packet::control(9, 1000, flags::ACK);
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded.header.seq, 9);
        assert_eq!(decoded.header.ack, 1000);
        assert_eq!(decoded.header.pkt_num, 0);
        assert_eq!(decoded.header.flags, flags::ACK);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let payload = b"exactly twelve!";
        let bytes = make_packet(0, 0, 1, flags::DATA, payload).encode();
        assert_eq!(bytes.len(), HEADER_LEN + payload.len());
    }

    #[test]
    fn seq_ack_big_endian_on_wire() {
        let bytes = make_packet(0x0102_0304, 0x0506_0708, 0x090A_0B0C, 0, b"").encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[OFF_PKT_NUM..OFF_PKT_NUM + 4], &[0x09, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn flags_occupy_high_nibble_only() {
        let bytes = make_packet(0, 0, 0, flags::SYN | flags::ACK, b"").encode();
        assert_eq!(bytes[OFF_FLAGS] & 0xF0, 0xC0); // SYN | ACK = 0xC000
    }

    #[test]
    fn checksum_bits_in_flags_field_are_ignored_on_encode() {
        let clean = make_packet(1, 2, 3, flags::DATA, b"x").encode();
        let dirty = make_packet(1, 2, 3, flags::DATA | 0x0ABC, b"x").encode();
        assert_eq!(clean, dirty);
    }

    #[test]
    fn multiple_flag_bits() {
        let pkt = Packet::control(5, 6, flags::SYN | flags::ACK);
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded.header.flags, flags::SYN | flags::ACK);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::TooShort));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::TooShort)
        );
    }

    #[test]
    fn corrupt_header_byte_fails_verification() {
        let mut bytes = make_packet(99, 0, 1, flags::DATA, b"test").encode();
        bytes[0] ^= 0xFF;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::ChecksumMismatch));
    }

    #[test]
    fn corrupt_flag_bit_fails_verification() {
        // Flipping a flag bit changes the CRC input, so the stored checksum
        // no longer matches.
        let mut bytes = Packet::control(0, 0, flags::SYN).encode();
        bytes[OFF_FLAGS] ^= 0x40; // SYN → SYN|ACK
        assert_eq!(Packet::decode(&bytes), Err(PacketError::ChecksumMismatch));
    }

    #[test]
    fn corrupt_checksum_bit_fails_verification() {
        let mut bytes = make_packet(1, 2, 3, flags::DATA, b"abc").encode();
        bytes[OFF_FLAGS + 1] ^= 0x01;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::ChecksumMismatch));
    }

    #[test]
    fn corrupt_payload_byte_fails_verification() {
        let mut bytes = make_packet(0, 0, 7, flags::DATA, b"payload bytes").encode();
        bytes[HEADER_LEN + 4] ^= 0xFF;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::ChecksumMismatch));
    }

    #[test]
    fn truncated_payload_fails_verification() {
        let mut bytes = make_packet(0, 0, 1, flags::DATA, b"data").encode();
        bytes.pop();
        assert_eq!(Packet::decode(&bytes), Err(PacketError::ChecksumMismatch));
    }

    #[test]
    fn crc12_of_empty_input_is_masked_init() {
        assert_eq!(crc12(&[]), CRC_INIT & CHECKSUM_MASK);
    }

    #[test]
    fn header_len_constant_is_correct() {
        // seq(4) + ack(4) + pkt_num(4) + flags-and-checksum(2) = 14
        assert_eq!(HEADER_LEN, 14);
    }
}
