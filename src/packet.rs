use std::fmt;

use crate::error::{DrtpError, Result};
use crate::HEADER_LEN;

const FIN_BIT: u16 = 0b001;
const ACK_BIT: u16 = 0b010;
const SYN_BIT: u16 = 0b100;

/// Pack the three header fields in network byte order.
pub fn encode_header(seq: u16, ack: u16, flags: u16) -> [u8; HEADER_LEN] {
    let mut bytes = [0; HEADER_LEN];
    bytes[0..2].copy_from_slice(&seq.to_be_bytes());
    bytes[2..4].copy_from_slice(&ack.to_be_bytes());
    bytes[4..6].copy_from_slice(&flags.to_be_bytes());
    bytes
}

/// Unpack `(seq, ack, flags)` from the first six bytes of `buf`.
pub fn decode_header(buf: &[u8]) -> Result<(u16, u16, u16)> {
    if buf.len() < HEADER_LEN {
        return Err(DrtpError::MalformedHeader { len: buf.len() });
    }

    let seq = u16::from_be_bytes([buf[0], buf[1]]);
    let ack = u16::from_be_bytes([buf[2], buf[3]]);
    let flags = u16::from_be_bytes([buf[4], buf[5]]);
    Ok((seq, ack, flags))
}

/// Control bits of a header. Reserved bits never survive a decode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
}

impl Flags {
    pub const DATA: Flags = Flags::new(false, false, false);
    pub const SYN: Flags = Flags::new(true, false, false);
    pub const SYN_ACK: Flags = Flags::new(true, true, false);
    pub const ACK: Flags = Flags::new(false, true, false);
    pub const FIN: Flags = Flags::new(false, false, true);
    pub const FIN_ACK: Flags = Flags::new(false, true, true);

    const fn new(syn: bool, ack: bool, fin: bool) -> Self {
        Self { syn, ack, fin }
    }

    pub fn from_bits(bits: u16) -> Self {
        Self {
            syn: bits & SYN_BIT != 0,
            ack: bits & ACK_BIT != 0,
            fin: bits & FIN_BIT != 0,
        }
    }

    pub fn bits(self) -> u16 {
        let mut bits = 0;
        if self.syn {
            bits |= SYN_BIT;
        }
        if self.ack {
            bits |= ACK_BIT;
        }
        if self.fin {
            bits |= FIN_BIT;
        }
        bits
    }

    pub fn is_data(self) -> bool {
        self == Flags::DATA
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_data() {
            return f.write_str("DATA");
        }
        let names: Vec<&str> = [(self.syn, "SYN"), (self.fin, "FIN"), (self.ack, "ACK")]
            .into_iter()
            .filter_map(|(set, name)| set.then_some(name))
            .collect();
        f.write_str(&names.join("|"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub seq: u16,
    pub ack: u16,
    pub flags: Flags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrtpPacket {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl DrtpPacket {
    pub fn new(seq: u16, ack: u16, flags: Flags, payload: Vec<u8>) -> Self {
        Self {
            header: Header { seq, ack, flags },
            payload,
        }
    }

    /// Connection request, always `seq = 1`.
    pub fn syn() -> Self {
        Self::new(1, 0, Flags::SYN, Vec::new())
    }

    pub fn syn_ack(ack: u16) -> Self {
        Self::new(1, ack, Flags::SYN_ACK, Vec::new())
    }

    pub fn ack(ack: u16) -> Self {
        Self::new(0, ack, Flags::ACK, Vec::new())
    }

    pub fn data(seq: u16, payload: Vec<u8>) -> Self {
        Self::new(seq, 0, Flags::DATA, payload)
    }

    pub fn fin() -> Self {
        Self::new(0, 0, Flags::FIN, Vec::new())
    }

    pub fn fin_ack() -> Self {
        Self::new(1, 0, Flags::FIN_ACK, Vec::new())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let Header { seq, ack, flags } = self.header;
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len());
        bytes.extend_from_slice(&encode_header(seq, ack, flags.bits()));
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let (seq, ack, flags) = decode_header(buf)?;
        Ok(Self::new(
            seq,
            ack,
            Flags::from_bits(flags),
            buf[HEADER_LEN..].to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian() {
        let bytes = encode_header(0x0102, 0x0304, 0x0006);
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04, 0x00, 0x06]);
    }

    #[test]
    fn header_round_trips_extremes() {
        for (seq, ack, flags) in [(0, 0, 0), (u16::MAX, u16::MAX, 0b111), (1, 65534, 0b010)] {
            let bytes = encode_header(seq, ack, flags);
            assert_eq!(decode_header(&bytes).unwrap(), (seq, ack, flags));
        }
    }

    #[test]
    fn short_buffer_is_malformed() {
        let err = decode_header(&[0, 1, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, DrtpError::MalformedHeader { len: 5 }));
        assert!(DrtpPacket::deserialize(&[]).is_err());
    }

    #[test]
    fn reserved_flag_bits_are_ignored() {
        let flags = Flags::from_bits(0xfff8 | ACK_BIT);
        assert_eq!(flags, Flags::ACK);
        assert_eq!(flags.bits(), 0b010);
    }

    #[test]
    fn flag_bits_match_the_wire_layout() {
        assert_eq!(Flags::FIN.bits(), 0b001);
        assert_eq!(Flags::ACK.bits(), 0b010);
        assert_eq!(Flags::SYN.bits(), 0b100);
        assert_eq!(Flags::SYN_ACK.bits(), 0b110);
        assert_eq!(Flags::FIN_ACK.bits(), 0b011);
        assert_eq!(Flags::DATA.bits(), 0);
    }

    #[test]
    fn flags_display() {
        assert_eq!(Flags::SYN_ACK.to_string(), "SYN|ACK");
        assert_eq!(Flags::FIN_ACK.to_string(), "FIN|ACK");
        assert_eq!(Flags::DATA.to_string(), "DATA");
    }

    #[test]
    fn data_packet_carries_payload() {
        let pkt = DrtpPacket::data(7, b"chunk".to_vec());
        let bytes = pkt.serialize();
        assert_eq!(bytes.len(), HEADER_LEN + 5);
        assert_eq!(&bytes[..HEADER_LEN], &[0, 7, 0, 0, 0, 0]);

        let decoded = DrtpPacket::deserialize(&bytes).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn full_chunk_fits_one_datagram() {
        let bytes = DrtpPacket::data(1, vec![0xab; crate::CHUNK_SIZE]).serialize();
        assert_eq!(bytes.len(), crate::MAX_DATAGRAM_SIZE);
        assert!(bytes.len() <= crate::RECV_BUF_SIZE);
    }

    #[test]
    fn control_packets_have_no_payload() {
        for pkt in [
            DrtpPacket::syn(),
            DrtpPacket::syn_ack(2),
            DrtpPacket::ack(3),
            DrtpPacket::fin(),
            DrtpPacket::fin_ack(),
        ] {
            assert_eq!(pkt.serialize().len(), HEADER_LEN);
        }
        assert_eq!(DrtpPacket::syn().header.seq, 1);
        assert_eq!(DrtpPacket::fin_ack().header.flags, Flags::FIN_ACK);
    }
}
