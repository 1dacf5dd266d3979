//! UDP 전송 어댑터
//!
//! 하나의 UDP 소켓을 감싸서 `(피어 주소, Segment)` 단위로 송수신한다.
//! 타임아웃과 손상된 세그먼트는 모두 [`Received::NoData`] 로 접힌다.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::segment::Segment;
use crate::Result;

/// 수신 버퍼 크기
const RECV_BUFFER_SIZE: usize = 65535;

/// 수신 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// 검증된 세그먼트
    Segment(SocketAddr, Segment),

    /// 타임아웃 또는 손상 세그먼트 폐기
    NoData,
}

/// 공유 UDP 소켓
///
/// 복제해도 같은 소켓과 수신 버퍼를 가리킨다. 재전송 태스크마다 하나씩 복제해서 넘긴다.
#[derive(Debug, Clone)]
pub struct Transport {
    socket: Arc<UdpSocket>,

    /// 수신 버퍼 (수신자끼리 공유, 한 번에 하나만 수신)
    recv_buf: Arc<Mutex<Vec<u8>>>,

    local_addr: SocketAddr,
    loss_rate: f64,
}

impl Transport {
    /// 소켓 바인딩
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        debug!("UDP socket bound: {}", local_addr);

        Ok(Self {
            socket: Arc::new(socket),
            recv_buf: Arc::new(Mutex::new(vec![0u8; RECV_BUFFER_SIZE])),
            local_addr,
            loss_rate: 0.0,
        })
    }

    /// 송신 손실 시뮬레이션 확률 설정
    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn loss_rate(&self) -> f64 {
        self.loss_rate
    }

    /// 세그먼트 송신 (전달 보장 없음)
    pub async fn send(&self, peer: SocketAddr, segment: &Segment) -> Result<()> {
        if self.loss_rate > 0.0 && rand::random::<f64>() < self.loss_rate {
            trace!("simulated loss: {} -> {}", segment, peer);
            return Ok(());
        }

        self.socket.send_to(&segment.to_wire(), peer).await?;
        trace!("sent {} -> {}", segment, peer);
        Ok(())
    }

    /// 타임아웃 내 세그먼트 하나 수신
    ///
    /// 아무것도 오지 않았거나 디코딩에 실패하면 `NoData`.
    pub async fn receive(&self, timeout: Duration) -> Result<Received> {
        let recv = async {
            let mut buf = self.recv_buf.lock().await;
            let received = self.socket.recv_from(&mut buf[..]).await;
            received.map(|(len, peer)| (Segment::from_wire(&buf[..len]), peer))
        };

        let (decoded, peer) = match tokio::time::timeout(timeout, recv).await {
            Err(_) => return Ok(Received::NoData),
            Ok(Ok(received)) => received,
            Ok(Err(e)) if is_transient(&e) => {
                debug!("transient receive error: {}", e);
                return Ok(Received::NoData);
            }
            Ok(Err(e)) => return Err(e.into()),
        };

        match decoded {
            Ok(segment) => {
                trace!("received {} <- {}", segment, peer);
                Ok(Received::Segment(peer, segment))
            }
            Err(e) => {
                debug!("세그먼트 폐기 ({}): {}", peer, e);
                Ok(Received::NoData)
            }
        }
    }
}

/// ICMP 응답 등으로 올라오는 일시적 에러
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}
