//! CRC-16/CCITT 체크섬
//!
//! 다항식 0x1021, 초기값 0xFFFF, MSB 우선, 최종 XOR 없음.
//! (CRC-16/CCITT-FALSE)

/// CRC 다항식
const POLYNOMIAL: u16 = 0x1021;

/// 초기값
const INITIAL: u16 = 0xFFFF;

/// 바이트 단위 룩업 테이블
const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// 바이트 버퍼의 CRC-16 계산
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |crc, &byte| {
        (crc << 8) ^ TABLE[((crc >> 8) as u8 ^ byte) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 테이블 없이 비트 단위로 계산하는 기준 구현
    fn bitwise_reference(data: &[u8]) -> u16 {
        let mut crc = INITIAL;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 {
                    (crc << 1) ^ POLYNOMIAL
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum(b""), 0xFFFF);
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(checksum(b"hello world"), 0xEFEB);
        assert_eq!(checksum(b"123456789"), 0x29B1);
        assert_eq!(checksum(b"A"), 0xB915);
    }

    #[test]
    fn test_matches_bitwise_reference() {
        let data: Vec<u8> = (0..=255u8).collect();
        assert_eq!(checksum(&data), 0x3FBD);

        for len in 0..data.len() {
            assert_eq!(checksum(&data[..len]), bitwise_reference(&data[..len]));
        }
    }

    #[test]
    fn test_single_byte_change_detected() {
        let original = b"segment payload".to_vec();
        let base = checksum(&original);

        for i in 0..original.len() {
            let mut tampered = original.clone();
            tampered[i] ^= 0x01;
            assert_ne!(checksum(&tampered), base);
        }
    }
}
