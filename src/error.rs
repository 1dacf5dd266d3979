//! 에러 타입 정의

use std::net::SocketAddr;

use thiserror::Error;

/// RFT 프로토콜 에러 타입
///
/// 타임아웃, 체크섬 불일치, 순서가 어긋난 세그먼트 같은 일시적 상황은
/// 프로토콜 계층 안에서 재전송/폐기로 처리되며 여기까지 올라오지 않는다.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("체크섬 불일치: expected {expected:04X}, got {got:04X}")]
    InvalidChecksum { expected: u16, got: u16 },

    #[error("세그먼트가 너무 짧음: {len} bytes (최소 {min} bytes)")]
    Truncated { len: usize, min: usize },

    #[error("FEC 인코딩 길이가 홀수: {0} bytes")]
    OddLength(usize),

    #[error("유효하지 않은 메타데이터: {0}")]
    InvalidMetadata(String),

    #[error("청크 인덱스 범위 초과: index={index}, total={total}")]
    ChunkOutOfRange { index: u64, total: u64 },

    #[error("파일 크기 초과 쓰기: {written} bytes 기록, 예상 {expected} bytes")]
    SinkOverflow { written: u64, expected: u64 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("피어 응답 없음: {0}")]
    PeerTimeout(SocketAddr),

    #[error("잘못된 연결 상태: {0}")]
    InvalidState(&'static str),

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("사용자 중단")]
    Interrupted,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
