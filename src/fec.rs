//! 순방향 오류 정정 (FEC)
//!
//! 니블(4비트)마다 Hamming(7,4) 코드워드 1바이트를 만든다 (2배 확장).
//!
//! ```text
//!  bit:  7    6    5    4    3    2    1    0
//!       p1   p2   d0   p3   d1   d2   d3   (미사용, 0)
//! ```
//!
//! - p1 = d0 ^ d1 ^ d3, p2 = d0 ^ d2 ^ d3, p3 = d1 ^ d2 ^ d3
//! - 디코딩 시 신드롬으로 7비트 코드워드의 단일 비트 오류를 정정
//! - 미사용 비트의 오류는 결과에 영향 없음
//!
//! 한 니블 안에서 2비트 이상 뒤집히면 검출되지 않고 잘못된 값이 나온다.
//! 이런 경우는 상위 계층의 CRC-16 검증에서 걸러진다.

/// 니블 → 코드워드
const ENCODE_TABLE: [u8; 16] = build_encode_table();

/// 코드워드 → 니블 (단일 비트 정정 포함)
const DECODE_TABLE: [u8; 256] = build_decode_table();

const fn bit(value: u8, index: u8) -> u8 {
    (value >> index) & 1
}

/// 코드워드 위치 1..=7 은 비트 7..=1 에 대응
const fn at(word: u8, pos: u8) -> u8 {
    bit(word, 8 - pos)
}

const fn encode_nibble(nibble: u8) -> u8 {
    let d0 = bit(nibble, 3);
    let d1 = bit(nibble, 2);
    let d2 = bit(nibble, 1);
    let d3 = bit(nibble, 0);

    let p1 = d0 ^ d1 ^ d3;
    let p2 = d0 ^ d2 ^ d3;
    let p3 = d1 ^ d2 ^ d3;

    (p1 << 7) | (p2 << 6) | (d0 << 5) | (p3 << 4) | (d1 << 3) | (d2 << 2) | (d3 << 1)
}

const fn decode_codeword(codeword: u8) -> u8 {
    let mut word = codeword;

    let s1 = at(word, 1) ^ at(word, 3) ^ at(word, 5) ^ at(word, 7);
    let s2 = at(word, 2) ^ at(word, 3) ^ at(word, 6) ^ at(word, 7);
    let s3 = at(word, 4) ^ at(word, 5) ^ at(word, 6) ^ at(word, 7);
    let syndrome = (s3 << 2) | (s2 << 1) | s1;

    if syndrome != 0 {
        word ^= 1 << (8 - syndrome);
    }

    (at(word, 3) << 3) | (at(word, 5) << 2) | (at(word, 6) << 1) | at(word, 7)
}

const fn build_encode_table() -> [u8; 16] {
    let mut table = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        table[i] = encode_nibble(i as u8);
        i += 1;
    }
    table
}

const fn build_decode_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode_codeword(i as u8);
        i += 1;
    }
    table
}

/// 바이트열 인코딩 (상위 니블 먼저)
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        out.push(ENCODE_TABLE[(byte >> 4) as usize]);
        out.push(ENCODE_TABLE[(byte & 0x0F) as usize]);
    }
    out
}

/// 바이트열 디코딩
///
/// 홀수 길이면 마지막 바이트는 짝이 없으므로 무시한다.
pub fn decode(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(2)
        .map(|pair| (DECODE_TABLE[pair[0] as usize] << 4) | DECODE_TABLE[pair[1] as usize])
        .collect()
}
