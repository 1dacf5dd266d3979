//! 세그먼트 와이어 포맷
//!
//! FEC 인코딩 전 레이아웃 (리틀 엔디안):
//!
//! ```text
//!  offset 0  : u32 sequence_number
//!  offset 4  : u32 ack_number
//!  offset 8  : u8  flags   (bit0=FIN, bit1=SYN, bit4=ACK)
//!  offset 9  : u8  reserved (항상 0)
//!  offset 10 : u16 checksum (offset 0..9 + payload 에 대한 CRC-16)
//!  offset 12+: payload
//! ```
//!
//! 위 버퍼 전체를 [`crate::fec`] 로 감싸서 전송한다 (와이어 상 2배 크기).

use std::fmt;

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::checksum::checksum;
use crate::{fec, Error, Result, HEADER_SIZE};

bitflags! {
    /// 세그먼트 플래그
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u8 {
        const FIN = 1 << 0;
        const SYN = 1 << 1;
        const ACK = 1 << 4;
    }
}

/// 플래그 조합으로 분류한 세그먼트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// 플래그 없음 (데이터)
    Data,
    Syn,
    Ack,
    SynAck,
    Fin,
    FinAck,
    /// 정의되지 않은 조합 (수신측은 기본 처리로 넘김)
    Unknown,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentKind::Data => "DATA",
            SegmentKind::Syn => "SYN",
            SegmentKind::Ack => "ACK",
            SegmentKind::SynAck => "SYN-ACK",
            SegmentKind::Fin => "FIN",
            SegmentKind::FinAck => "FIN-ACK",
            SegmentKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// 프로토콜 교환 단위
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub sequence_number: u32,
    pub ack_number: u32,
    pub flags: SegmentFlags,
    pub payload: Bytes,
}

impl Segment {
    fn control(sequence_number: u32, ack_number: u32, flags: SegmentFlags) -> Self {
        Self {
            sequence_number,
            ack_number,
            flags,
            payload: Bytes::new(),
        }
    }

    /// 연결 요청
    pub fn syn(seq: u32) -> Self {
        Self::control(seq, 0, SegmentFlags::SYN)
    }

    pub fn ack(seq: u32, ack: u32) -> Self {
        Self::control(seq, ack, SegmentFlags::ACK)
    }

    pub fn syn_ack(seq: u32, ack: u32) -> Self {
        Self::control(seq, ack, SegmentFlags::SYN | SegmentFlags::ACK)
    }

    /// 연결 종료 요청
    pub fn fin(seq: u32) -> Self {
        Self::control(seq, 0, SegmentFlags::FIN)
    }

    pub fn fin_ack(seq: u32, ack: u32) -> Self {
        Self::control(seq, ack, SegmentFlags::FIN | SegmentFlags::ACK)
    }

    /// 데이터 세그먼트 (시퀀스 번호는 송신자가 채운다)
    pub fn data(payload: Bytes) -> Self {
        Self {
            sequence_number: 0,
            ack_number: 0,
            flags: SegmentFlags::empty(),
            payload,
        }
    }

    /// 시퀀스 번호 지정
    pub fn with_sequence(mut self, seq: u32) -> Self {
        self.sequence_number = seq;
        self
    }

    pub fn kind(&self) -> SegmentKind {
        let syn = SegmentFlags::SYN;
        let ack = SegmentFlags::ACK;
        let fin = SegmentFlags::FIN;

        match self.flags {
            f if f.is_empty() => SegmentKind::Data,
            f if f == syn => SegmentKind::Syn,
            f if f == ack => SegmentKind::Ack,
            f if f == fin => SegmentKind::Fin,
            f if f == syn | ack => SegmentKind::SynAck,
            f if f == fin | ack => SegmentKind::FinAck,
            _ => SegmentKind::Unknown,
        }
    }

    /// 체크섬 대상 바이트에 대한 CRC-16 (reserved 바이트와 체크섬 필드 제외)
    pub fn checksum(&self) -> u16 {
        let mut buf = Vec::with_capacity(9 + self.payload.len());
        buf.extend_from_slice(&self.sequence_number.to_le_bytes());
        buf.extend_from_slice(&self.ack_number.to_le_bytes());
        buf.push(self.flags.bits());
        buf.extend_from_slice(&self.payload);
        checksum(&buf)
    }

    /// FEC 적용 전 바이트열
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u32_le(self.sequence_number);
        buf.put_u32_le(self.ack_number);
        buf.put_u8(self.flags.bits());
        buf.put_u8(0);
        buf.put_u16_le(self.checksum());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// FEC 적용 전 바이트열에서 파싱 (체크섬 검증 포함)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::Truncated {
                len: bytes.len(),
                min: HEADER_SIZE,
            });
        }

        let mut header = &bytes[..HEADER_SIZE];
        let sequence_number = header.get_u32_le();
        let ack_number = header.get_u32_le();
        let flags = SegmentFlags::from_bits_retain(header.get_u8());
        let _reserved = header.get_u8();
        let expected = header.get_u16_le();

        let segment = Self {
            sequence_number,
            ack_number,
            flags,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        };

        let got = segment.checksum();
        if got != expected {
            return Err(Error::InvalidChecksum { expected, got });
        }

        Ok(segment)
    }

    /// 와이어 바이트열 (FEC 인코딩 포함)
    pub fn to_wire(&self) -> Vec<u8> {
        fec::encode(&self.to_bytes())
    }

    /// 와이어 바이트열에서 디코딩
    ///
    /// FEC 디코딩 후 체크섬을 검증한다. 에러는 수신 경로에서 손실과 동일하게 취급된다.
    pub fn from_wire(wire: &[u8]) -> Result<Self> {
        if wire.len() % 2 != 0 {
            return Err(Error::OddLength(wire.len()));
        }
        Self::from_bytes(&fec::decode(wire))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seq={} ack={} len={}",
            self.kind(),
            self.sequence_number,
            self.ack_number,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_flags() {
        assert_eq!(Segment::syn(7).kind(), SegmentKind::Syn);
        assert_eq!(Segment::ack(7, 8).kind(), SegmentKind::Ack);
        assert_eq!(Segment::syn_ack(7, 8).kind(), SegmentKind::SynAck);
        assert_eq!(Segment::fin(7).kind(), SegmentKind::Fin);
        assert_eq!(Segment::fin_ack(7, 8).kind(), SegmentKind::FinAck);
        assert_eq!(Segment::data(Bytes::from_static(b"x")).kind(), SegmentKind::Data);

        let syn = Segment::syn(42);
        assert_eq!(syn.ack_number, 0);
        assert!(syn.payload.is_empty());
    }

    #[test]
    fn test_wire_roundtrip() {
        let segments = [
            Segment::syn(u32::MAX),
            Segment::syn_ack(1, 2),
            Segment::fin_ack(1000, 2001),
            Segment::data(Bytes::from(vec![0xAB; 1000])).with_sequence(77),
            Segment::data(Bytes::new()),
        ];

        for segment in segments {
            let decoded = Segment::from_wire(&segment.to_wire()).unwrap();
            assert_eq!(decoded, segment);
        }
    }

    #[test]
    fn test_header_layout() {
        let segment = Segment::ack(0x0102_0304, 0x0A0B_0C0D);
        let bytes = segment.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[4..8], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(bytes[8], 0b0001_0000);
        assert_eq!(bytes[9], 0);
        assert_eq!(
            u16::from_le_bytes([bytes[10], bytes[11]]),
            checksum(&[0x04, 0x03, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A, 0x10])
        );
    }

    #[test]
    fn test_wire_is_double_size() {
        let segment = Segment::data(Bytes::from_static(b"payload"));
        assert_eq!(segment.to_wire().len(), (HEADER_SIZE + 7) * 2);
    }

    #[test]
    fn test_tampered_byte_rejected() {
        let segment = Segment::data(Bytes::from_static(b"tamper me")).with_sequence(5);
        let bytes = segment.to_bytes();

        for i in 0..bytes.len() {
            if i == 9 {
                // reserved 바이트는 체크섬 대상이 아님
                continue;
            }
            let mut tampered = bytes.to_vec();
            tampered[i] ^= 0x40;
            assert!(
                Segment::from_bytes(&tampered).is_err(),
                "byte {i} tamper not detected"
            );
        }
    }

    #[test]
    fn test_single_bit_wire_error_corrected() {
        let segment = Segment::data(Bytes::from_static(b"noisy channel")).with_sequence(9);
        let mut wire = segment.to_wire();
        wire[3] ^= 0b0000_1000;
        wire[20] ^= 0b1000_0000;

        assert_eq!(Segment::from_wire(&wire).unwrap(), segment);
    }

    #[test]
    fn test_truncated_and_odd_input() {
        assert!(matches!(
            Segment::from_bytes(&[0u8; 5]),
            Err(Error::Truncated { len: 5, .. })
        ));
        assert!(matches!(
            Segment::from_wire(&[0u8; 3]),
            Err(Error::OddLength(3))
        ));
    }

    #[test]
    fn test_unknown_flag_combination_still_decodes() {
        let segment = Segment {
            sequence_number: 1,
            ack_number: 2,
            flags: SegmentFlags::SYN | SegmentFlags::FIN,
            payload: Bytes::new(),
        };
        let decoded = Segment::from_wire(&segment.to_wire()).unwrap();
        assert_eq!(decoded.kind(), SegmentKind::Unknown);
    }
}
