//! 전송 통계

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 재전송 태스크와 공유하는 통계 핸들
pub type SharedStats = Arc<Mutex<TransferStats>>;

/// 연결 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 최초 전송한 세그먼트 수
    pub segments_sent: u64,

    /// 재전송 횟수
    pub retransmissions: u64,

    /// 재시도 한도에 도달해 포기한 세그먼트 수
    pub abandoned_segments: u64,

    /// 윈도우를 전진시킨 ACK 수
    pub acks_received: u64,

    /// 무시된 중복/지난 ACK 수
    pub stale_acks: u64,

    /// 순서대로 전달된 세그먼트 수
    pub segments_delivered: u64,

    /// 이미 받은 세그먼트 재수신 횟수
    pub duplicate_segments: u64,

    /// 너무 앞선 세그먼트 폐기 횟수
    pub out_of_order_segments: u64,

    /// 전달 완료된 파일 바이트
    pub total_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            segments_sent: 0,
            retransmissions: 0,
            abandoned_segments: 0,
            acks_received: 0,
            stale_acks: 0,
            segments_delivered: 0,
            duplicate_segments: 0,
            out_of_order_segments: 0,
            total_bytes: 0,
        }
    }

    /// 공유 핸들 생성
    pub fn shared() -> SharedStats {
        Arc::new(Mutex::new(Self::new()))
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmit_ratio(&self) -> f64 {
        let total = self.segments_sent + self.retransmissions;
        if total == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / total as f64
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} MB/s | Sent: {} | Retransmits: {} ({:.1}%) | ACKs: {} (stale {}) | Delivered: {} (dup {}, ooo {})",
            self.elapsed().as_secs_f64(),
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.segments_sent,
            self.retransmissions,
            self.retransmit_ratio() * 100.0,
            self.acks_received,
            self.stale_acks,
            self.segments_delivered,
            self.duplicate_segments,
            self.out_of_order_segments,
        )
    }
}
