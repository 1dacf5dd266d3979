//! 슬라이딩 윈도우 송신자 (서버측)
//!
//! - 최대 `window_size` 개의 데이터 세그먼트만 비행 중
//! - 세그먼트마다 독립 재전송 태스크
//! - 누적 ACK 로 윈도우 전진
//!
//! 시퀀스 번호는 `initial_sequence` 기준 상대 인덱스로 관리한다.
//! 인덱스 0 은 메타데이터, 1.. 은 파일 청크.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::file::FileSource;
use crate::resend::{ResendPolicy, ResendTask};
use crate::segment::Segment;
use crate::socket::Transport;
use crate::stats::SharedStats;
use crate::Result;

/// 비행 중인 세그먼트
#[derive(Debug)]
struct InFlight {
    index: u64,
    payload_len: usize,
    task: ResendTask,
}

/// ACK 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 윈도우 전진
    Advanced { retired: u64, admitted: usize },

    /// 이미 확인된 범위 (중복/지난 ACK)
    Stale,

    /// 아직 보내지 않은 세그먼트에 대한 ACK
    Invalid,
}

/// 슬라이딩 윈도우 송신자
#[derive(Debug)]
pub struct SlidingWindowSender {
    source: FileSource,
    transport: Transport,
    peer: SocketAddr,
    policy: ResendPolicy,
    window_size: usize,

    /// 0번 세그먼트(메타데이터)의 시퀀스 번호
    initial_sequence: u32,

    /// 확인된 세그먼트 수
    acked: u64,

    /// 윈도우에 넣은 세그먼트 수
    sent: u64,

    in_flight: VecDeque<InFlight>,
    stats: SharedStats,
}

impl SlidingWindowSender {
    pub fn new(
        source: FileSource,
        transport: Transport,
        peer: SocketAddr,
        initial_sequence: u32,
        window_size: usize,
        policy: ResendPolicy,
        stats: SharedStats,
    ) -> Self {
        Self {
            source,
            transport,
            peer,
            policy,
            window_size: window_size.max(1),
            initial_sequence,
            acked: 0,
            sent: 0,
            in_flight: VecDeque::with_capacity(window_size),
            stats,
        }
    }

    /// 첫 윈도우 채우기
    pub fn start(&mut self) -> Result<usize> {
        info!(
            "전송 시작 -> {}: {} ({} bytes, {} chunks, window {})",
            self.peer,
            self.source.metadata().file_name(),
            self.source.size(),
            self.source.total_chunks(),
            self.window_size
        );
        self.admit()
    }

    /// 누적 ACK 처리
    ///
    /// `ack_number` 는 피어가 다음에 기대하는 시퀀스 번호.
    pub fn on_ack(&mut self, ack_number: u32) -> Result<AckOutcome> {
        let acked = u64::from(ack_number.wrapping_sub(self.initial_sequence));

        if acked <= self.acked {
            self.stats.lock().stale_acks += 1;
            debug!("stale ACK {} from {} (acked {})", ack_number, self.peer, self.acked);
            return Ok(AckOutcome::Stale);
        }

        if acked > self.sent {
            warn!(
                "보내지 않은 세그먼트에 대한 ACK: {} from {} (sent {})",
                ack_number, self.peer, self.sent
            );
            return Ok(AckOutcome::Invalid);
        }

        let retired = acked - self.acked;
        let mut bytes = 0u64;
        for _ in 0..retired {
            if let Some(entry) = self.in_flight.pop_front() {
                entry.task.cancel();
                if entry.index > 0 {
                    bytes += entry.payload_len as u64;
                }
            }
        }
        self.acked = acked;

        {
            let mut stats = self.stats.lock();
            stats.acks_received += 1;
            stats.total_bytes += bytes;
        }

        let admitted = self.admit()?;
        debug!(
            "ACK {} from {}: retired {}, admitted {}, in flight {}",
            ack_number,
            self.peer,
            retired,
            admitted,
            self.in_flight.len()
        );

        if self.is_complete() {
            info!("전송 완료 -> {}: {}", self.peer, self.stats.lock());
        }

        Ok(AckOutcome::Advanced { retired, admitted })
    }

    /// 윈도우 여유만큼 새 세그먼트 투입
    fn admit(&mut self) -> Result<usize> {
        let mut admitted = 0;

        while self.in_flight.len() < self.window_size && self.sent < self.total_segments() {
            let index = self.sent;
            let payload = self.source.get_chunk(index)?;
            let payload_len = payload.len();
            let segment = Segment::data(payload).with_sequence(self.sequence_of(index));

            let task = ResendTask::spawn(
                self.transport.clone(),
                self.peer,
                segment,
                self.policy,
                Some(self.stats.clone()),
            );

            self.in_flight.push_back(InFlight {
                index,
                payload_len,
                task,
            });
            self.sent += 1;
            admitted += 1;
        }

        Ok(admitted)
    }

    fn sequence_of(&self, index: u64) -> u32 {
        self.initial_sequence.wrapping_add(index as u32)
    }

    /// 메타데이터 포함 전체 세그먼트 수
    pub fn total_segments(&self) -> u64 {
        self.source.total_chunks() + 1
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn acked(&self) -> u64 {
        self.acked
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// 모든 세그먼트가 확인되었는지
    pub fn is_complete(&self) -> bool {
        self.acked == self.total_segments()
    }

    /// 다음에 쓸 시퀀스 번호
    pub fn next_sequence(&self) -> u32 {
        self.sequence_of(self.sent)
    }

    /// 모든 재전송 태스크 취소
    pub fn cancel_all(&mut self) {
        for entry in self.in_flight.drain(..) {
            entry.task.cancel();
        }
    }

    /// 모든 재전송 태스크 취소 후 종료 대기
    pub async fn shutdown(&mut self) {
        for entry in self.in_flight.drain(..) {
            entry.task.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resend::Backoff;
    use crate::stats::TransferStats;
    use std::time::Duration;

    const ISN: u32 = 1000;

    async fn sender_with(chunks: usize, window: usize) -> (SlidingWindowSender, Transport) {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = Transport::bind(addr).await.unwrap();
        let peer = Transport::bind(addr).await.unwrap();

        let source = FileSource::from_bytes("file.bin", vec![1u8; chunks * 8], 8).unwrap();
        let policy = ResendPolicy {
            backoff: Backoff::Fixed(Duration::from_secs(10)),
            max_attempts: None,
        };

        let sender = SlidingWindowSender::new(
            source,
            transport,
            peer.local_addr(),
            ISN,
            window,
            policy,
            TransferStats::shared(),
        );
        (sender, peer)
    }

    #[tokio::test]
    async fn test_window_fills_on_start() {
        let (mut sender, _peer) = sender_with(10, 4).await;

        assert_eq!(sender.start().unwrap(), 4);
        assert_eq!(sender.in_flight(), 4);
        assert_eq!(sender.total_segments(), 11);
        assert_eq!(sender.next_sequence(), ISN + 4);
        sender.shutdown().await;
    }

    #[tokio::test]
    async fn test_cumulative_ack_admits_exactly_retired() {
        let (mut sender, _peer) = sender_with(10, 4).await;
        sender.start().unwrap();

        let outcome = sender.on_ack(ISN + 2).unwrap();
        assert_eq!(outcome, AckOutcome::Advanced { retired: 2, admitted: 2 });
        assert_eq!(sender.in_flight(), 4);
        assert_eq!(sender.sent(), 6);
        sender.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_and_invalid_acks_ignored() {
        let (mut sender, _peer) = sender_with(10, 4).await;
        sender.start().unwrap();
        sender.on_ack(ISN + 3).unwrap();

        assert_eq!(sender.on_ack(ISN + 3).unwrap(), AckOutcome::Stale);
        assert_eq!(sender.on_ack(ISN + 1).unwrap(), AckOutcome::Stale);
        assert_eq!(sender.on_ack(ISN + 50).unwrap(), AckOutcome::Invalid);
        assert_eq!(sender.acked(), 3);
        assert_eq!(sender.in_flight(), 4);
        assert_eq!(sender.stats.lock().stale_acks, 2);
        sender.shutdown().await;
    }

    #[tokio::test]
    async fn test_completes_when_everything_acked() {
        let (mut sender, _peer) = sender_with(3, 4).await;
        sender.start().unwrap();
        assert_eq!(sender.in_flight(), 4);

        sender.on_ack(ISN + 4).unwrap();
        assert!(sender.is_complete());
        assert_eq!(sender.in_flight(), 0);
        assert_eq!(sender.stats.lock().total_bytes, 24);
    }

    #[tokio::test]
    async fn test_sequence_wraps() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let transport = Transport::bind(addr).await.unwrap();
        let source = FileSource::from_bytes("wrap.bin", vec![0u8; 16], 8).unwrap();
        let policy = ResendPolicy {
            backoff: Backoff::Fixed(Duration::from_secs(10)),
            max_attempts: Some(1),
        };
        let mut sender = SlidingWindowSender::new(
            source,
            transport.clone(),
            transport.local_addr(),
            u32::MAX - 1,
            4,
            policy,
            TransferStats::shared(),
        );

        sender.start().unwrap();
        assert_eq!(sender.next_sequence(), 1);
        assert!(matches!(sender.on_ack(1).unwrap(), AckOutcome::Advanced { retired: 3, .. }));
        assert!(sender.is_complete());
    }
}
