//! 취소 가능한 재전송 태스크
//!
//! 비행 중인 데이터 세그먼트와 SYN-ACK / FIN / FIN-ACK 마다 하나씩 띄운다.
//! 태스크끼리는 상태를 공유하지 않고, 소유자가 취소 플래그를 세우면 멈춘다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::segment::Segment;
use crate::socket::Transport;
use crate::stats::SharedStats;

/// 재전송 간격 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 고정 간격
    Fixed(Duration),

    /// `initial * 2^(n-1)`, 최대 `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// `attempt` 번째 전송 후 대기 시간 (1부터)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(interval) => interval,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// 재전송 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendPolicy {
    pub backoff: Backoff,

    /// 최초 전송 포함 최대 전송 횟수 (`None` 이면 취소될 때까지)
    pub max_attempts: Option<u32>,
}

/// 세그먼트 하나를 반복 전송하는 백그라운드 태스크
///
/// 드롭하면 취소된다.
#[derive(Debug)]
pub struct ResendTask {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ResendTask {
    /// 태스크 시작 (즉시 1회 전송 후 정책에 따라 반복)
    pub fn spawn(
        transport: Transport,
        peer: SocketAddr,
        segment: Segment,
        policy: ResendPolicy,
        stats: Option<SharedStats>,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let handle = tokio::spawn(async move {
            let mut attempt: u32 = 0;

            loop {
                if flag.load(Ordering::Acquire) {
                    break;
                }

                if let Err(e) = transport.send(peer, &segment).await {
                    warn!("전송 실패 ({} -> {}): {}", segment, peer, e);
                }
                attempt += 1;

                if let Some(stats) = &stats {
                    let mut stats = stats.lock();
                    if attempt == 1 {
                        stats.segments_sent += 1;
                    } else {
                        stats.retransmissions += 1;
                    }
                }

                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    debug!("재전송 포기: {} -> {} ({} attempts)", segment, peer, attempt);
                    if let Some(stats) = &stats {
                        stats.lock().abandoned_segments += 1;
                    }
                    break;
                }

                tokio::time::sleep(policy.backoff.delay(attempt)).await;
            }
        });

        Self {
            cancelled,
            handle: Some(handle),
        }
    }

    /// 취소 (이후 전송 없음)
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// 태스크가 끝났는지 (취소 또는 재시도 한도 도달)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// 취소 후 종료까지 대기
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ResendTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Received;
    use crate::stats::TransferStats;

    async fn pair() -> (Transport, Transport) {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        (
            Transport::bind(addr).await.unwrap(),
            Transport::bind(addr).await.unwrap(),
        )
    }

    async fn count_received(transport: &Transport, window: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + window;
        let mut count = 0;
        while tokio::time::Instant::now() < deadline {
            if let Received::Segment(..) = transport.receive(Duration::from_millis(10)).await.unwrap() {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_millis(30));
        assert_eq!(backoff.delay(1), backoff.delay(9));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (a, b) = pair().await;
        let stats = TransferStats::shared();
        let policy = ResendPolicy {
            backoff: Backoff::Fixed(Duration::from_millis(10)),
            max_attempts: Some(3),
        };

        let task = ResendTask::spawn(a, b.local_addr(), Segment::syn(1), policy, Some(stats.clone()));

        assert_eq!(count_received(&b, Duration::from_millis(200)).await, 3);
        assert!(task.is_finished());

        let stats = stats.lock();
        assert_eq!(stats.segments_sent, 1);
        assert_eq!(stats.retransmissions, 2);
        assert_eq!(stats.abandoned_segments, 1);
    }

    #[tokio::test]
    async fn test_no_sends_after_shutdown() {
        let (a, b) = pair().await;
        let policy = ResendPolicy {
            backoff: Backoff::Fixed(Duration::from_millis(10)),
            max_attempts: None,
        };

        let task = ResendTask::spawn(a, b.local_addr(), Segment::fin(5), policy, None);
        assert!(count_received(&b, Duration::from_millis(50)).await >= 1);

        task.shutdown().await;
        // 이미 소켓 버퍼에 있던 것은 비움
        let _ = count_received(&b, Duration::from_millis(20)).await;
        assert_eq!(count_received(&b, Duration::from_millis(100)).await, 0);
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (a, b) = pair().await;
        let policy = ResendPolicy {
            backoff: Backoff::Fixed(Duration::from_millis(10)),
            max_attempts: None,
        };

        let task = ResendTask::spawn(a, b.local_addr(), Segment::fin(5), policy, None);
        let cancelled = task.cancelled.clone();
        drop(task);
        assert!(cancelled.load(Ordering::Acquire));

        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = count_received(&b, Duration::from_millis(20)).await;
        assert_eq!(count_received(&b, Duration::from_millis(100)).await, 0);
    }
}
