//! # RFT (Reliable File Transfer)
//!
//! UDP 위에 만든 연결 지향 신뢰성 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **3-way 핸드쉐이크 / 4-way 종료**: TCP 와 같은 연결 수명 관리
//! - **누적 ACK**: 시퀀스 번호 기반 순서 보장, 중복/역순 세그먼트 처리
//! - **슬라이딩 윈도우**: 고정 크기 윈도우, 세그먼트별 독립 재전송
//! - **CRC-16 + Hamming FEC**: 니블당 1비트 오류 정정, 나머지는 체크섬으로 폐기
//! - **단일 소켓 멀티플렉싱**: 여러 클라이언트에 순차/동시 전송

pub mod checksum;
pub mod config;
pub mod connection;
pub mod error;
pub mod fec;
pub mod file;
pub mod manager;
pub mod metadata;
pub mod receiver;
pub mod resend;
pub mod segment;
pub mod sender;
pub mod socket;
pub mod stats;

pub use config::Config;
pub use connection::{ClientConnection, ClientState, Connection, ServerConnection, ServerState, Status};
pub use error::{Error, Result};
pub use file::{FileSink, FileSource};
pub use manager::{ConnectionManager, TransferMode};
pub use metadata::Metadata;
pub use receiver::FileReceiver;
pub use resend::{Backoff, ResendPolicy, ResendTask};
pub use segment::{Segment, SegmentFlags, SegmentKind};
pub use sender::{AckOutcome, SlidingWindowSender};
pub use socket::{Received, Transport};
pub use stats::{SharedStats, TransferStats};

/// 세그먼트 헤더 크기 (FEC 적용 전)
pub const HEADER_SIZE: usize = 12;

/// 기본 세그먼트 크기 (바이트, FEC 적용 전)
pub const DEFAULT_SEGMENT_SIZE: usize = 16384; // 16KB -> 와이어 32KB

/// UDP 데이터그램 최대 페이로드 (IPv4)
pub const MAX_DATAGRAM_SIZE: usize = 65507;
