//! 연결 관리자 (서버측)
//!
//! 하나의 UDP 소켓을 여러 피어가 공유한다. 수신한 세그먼트는 피어 주소로
//! 대기 중인 핸드쉐이크 또는 수립된 연결에 분배된다.
//!
//! 1. [`ConnectionManager::listen`]: 핸드쉐이크 수락
//! 2. [`ConnectionManager::run`]: 수립된 연결마다 파일 전송 (순차 또는 동시)

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::connection::{Connection, ServerConnection};
use crate::file::FileSource;
use crate::resend::ResendTask;
use crate::segment::{Segment, SegmentKind};
use crate::socket::{Received, Transport};
use crate::{Config, Error, Result};

/// 전송 실행 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// 한 피어씩 끝까지
    Sequential,

    /// 모든 피어를 번갈아
    #[default]
    Concurrent,
}

/// 핸드쉐이크 진행 중인 피어
#[derive(Debug)]
struct PendingHandshake {
    /// 클라이언트 ISN
    client_sequence: u32,

    /// 서버 ISN
    server_sequence: u32,

    /// 첫 SYN 수신 시각 (새 ISN 으로 다시 와도 갱신하지 않음)
    started: Instant,

    /// SYN-ACK 재전송
    resend: ResendTask,
}

impl PendingHandshake {
    fn syn_ack(&self) -> Segment {
        Segment::syn_ack(self.server_sequence, self.client_sequence.wrapping_add(1))
    }
}

enum Event {
    Stop,
    Interrupt,
    Received(Received),
}

/// 연결 관리자
pub struct ConnectionManager {
    transport: Transport,
    config: Config,
    source: FileSource,
    pending: HashMap<SocketAddr, PendingHandshake>,
    connections: HashMap<SocketAddr, Connection>,

    /// 수립 순서 (순차 모드 전송 순서)
    order: Vec<SocketAddr>,

    accepting: bool,
}

impl ConnectionManager {
    /// 소켓 바인딩
    pub async fn bind(addr: SocketAddr, config: Config, source: FileSource) -> Result<Self> {
        config.validate()?;
        if source.chunk_size() > config.payload_size() {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} 가 세그먼트 페이로드 {} 보다 큼",
                source.chunk_size(),
                config.payload_size()
            )));
        }

        let transport = Transport::bind(addr).await?.with_loss_rate(config.loss_rate);
        info!(
            "서버 시작: {} (손실 시뮬레이션 {:.1}%)",
            transport.local_addr(),
            transport.loss_rate() * 100.0
        );

        Ok(Self {
            transport,
            config,
            source,
            pending: HashMap::new(),
            connections: HashMap::new(),
            order: Vec::new(),
            accepting: true,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// 수립 순서대로 연결된 피어
    pub fn established_peers(&self) -> Vec<SocketAddr> {
        self.order
            .iter()
            .filter(|peer| self.connections.contains_key(peer))
            .copied()
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// 핸드쉐이크 수락 단계
    ///
    /// `stop` 이 끝나거나 `max_connections` 에 도달하면 새 연결을 받지 않고,
    /// 진행 중인 핸드쉐이크가 모두 정리되면 반환한다.
    /// 수락을 멈춘 뒤 `interrupt` 가 끝나면 남은 핸드쉐이크와 연결을 모두 정리하고
    /// `Error::Interrupted` 를 반환한다.
    pub async fn listen<S, I>(&mut self, stop: S, interrupt: I) -> Result<()>
    where
        S: Future<Output = ()>,
        I: Future<Output = ()>,
    {
        tokio::pin!(stop);
        tokio::pin!(interrupt);
        info!("연결 대기 중: {}", self.local_addr());

        loop {
            self.check_capacity();
            if !self.accepting && self.pending.is_empty() {
                break;
            }

            let event = tokio::select! {
                _ = &mut stop, if self.accepting => Event::Stop,
                _ = &mut interrupt, if !self.accepting => Event::Interrupt,
                received = self.transport.receive(self.config.receive_timeout) => Event::Received(received?),
            };

            match event {
                Event::Stop => {
                    info!("새 연결 수락 중단 (대기 중 핸드쉐이크 {})", self.pending.len());
                    self.accepting = false;
                }
                Event::Interrupt => {
                    warn!("핸드쉐이크 대기 중 중단 (대기 {}, 수립 {})", self.pending.len(), self.connections.len());
                    self.shutdown().await;
                    return Err(Error::Interrupted);
                }
                Event::Received(Received::Segment(peer, segment)) => self.route(peer, segment).await?,
                Event::Received(Received::NoData) => {}
            }

            self.expire_pending();
            self.sweep().await;
        }

        info!("연결 수락 완료: {} peers", self.connections.len());
        Ok(())
    }

    /// 전송 단계
    ///
    /// `interrupt` 가 끝나면 모든 연결을 능동 종료하고 `Error::Interrupted` 를 반환한다.
    pub async fn run<F>(&mut self, mode: TransferMode, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let peers = self.established_peers();
        info!("전송 시작 ({:?}): {} peers", mode, peers.len());

        let result = match mode {
            TransferMode::Concurrent => {
                for peer in &peers {
                    self.begin(*peer)?;
                }
                self.pump(None, interrupt.as_mut()).await
            }
            TransferMode::Sequential => {
                let mut result = Ok(());
                for peer in peers {
                    if !self.connections.contains_key(&peer) {
                        continue;
                    }
                    self.begin(peer)?;
                    result = self.pump(Some(peer), interrupt.as_mut()).await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
        };

        match result {
            Err(Error::Interrupted) => {
                self.close_all().await;
                Err(Error::Interrupted)
            }
            other => {
                self.shutdown().await;
                other
            }
        }
    }

    /// 피어 전송 시작
    fn begin(&mut self, peer: SocketAddr) -> Result<()> {
        if let Some(Connection::Server(conn)) = self.connections.get_mut(&peer) {
            conn.begin_transfer(self.source.clone())?;
        }
        Ok(())
    }

    /// `target` 이 닫힐 때까지 (None 이면 전부) 소켓을 읽으며 분배
    async fn pump<F>(&mut self, target: Option<SocketAddr>, mut interrupt: Pin<&mut F>) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        loop {
            let done = match target {
                Some(peer) => !self.connections.contains_key(&peer),
                None => self.connections.is_empty(),
            };
            if done {
                return Ok(());
            }

            let event = tokio::select! {
                _ = &mut interrupt => Event::Interrupt,
                received = self.transport.receive(self.config.receive_timeout) => Event::Received(received?),
            };

            match event {
                Event::Stop | Event::Interrupt => return Err(Error::Interrupted),
                Event::Received(Received::Segment(peer, segment)) => self.route(peer, segment).await?,
                Event::Received(Received::NoData) => {}
            }

            self.expire_pending();
            self.sweep().await;
        }
    }

    /// 중단 시 모든 연결 능동 종료 (최대 `close_wait` 대기)
    async fn close_all(&mut self) {
        warn!("중단: {} 연결 종료 중", self.connections.len());
        self.accepting = false;

        for conn in self.connections.values_mut() {
            if let Err(e) = conn.close().await {
                warn!("종료 요청 실패 ({}): {}", conn.peer(), e);
            }
        }

        let deadline = Instant::now() + self.config.close_wait;
        while !self.connections.is_empty() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };

            match self.transport.receive(remaining.min(self.config.receive_timeout)).await {
                Ok(Received::Segment(peer, segment)) => {
                    if let Err(e) = self.route(peer, segment).await {
                        warn!("종료 중 처리 실패: {}", e);
                    }
                }
                Ok(Received::NoData) => {}
                Err(e) => {
                    warn!("종료 중 수신 실패: {}", e);
                    break;
                }
            }
            self.sweep().await;
        }

        if !self.connections.is_empty() {
            warn!("종료 응답 없는 연결 {} 개 강제 정리", self.connections.len());
        }
        self.shutdown().await;
    }

    /// 세그먼트 분배
    async fn route(&mut self, peer: SocketAddr, segment: Segment) -> Result<()> {
        if let Some(conn) = self.connections.get_mut(&peer) {
            if let Err(e) = conn.handle_message(segment).await {
                warn!("연결 처리 실패 ({}): {}", peer, e);
                self.drop_connection(peer).await;
            }
            return Ok(());
        }

        if let Some(pending) = self.pending.get_mut(&peer) {
            let complete = match segment.kind() {
                SegmentKind::Syn if segment.sequence_number == pending.client_sequence => {
                    self.transport.send(peer, &pending.syn_ack()).await?;
                    false
                }
                SegmentKind::Syn => {
                    debug!("새 ISN 으로 SYN 재수신: {}", peer);
                    pending.client_sequence = segment.sequence_number;
                    pending.resend = ResendTask::spawn(
                        self.transport.clone(),
                        peer,
                        pending.syn_ack(),
                        self.config.control_policy(),
                        None,
                    );
                    false
                }
                SegmentKind::Ack => segment.ack_number == pending.server_sequence.wrapping_add(1),
                _ => false,
            };

            if complete {
                self.promote(peer).await;
            } else {
                debug!("핸드쉐이크 중 세그먼트 ({}): {}", peer, segment);
            }
            return Ok(());
        }

        if self.accepting && segment.kind() == SegmentKind::Syn {
            let client_sequence = segment.sequence_number;
            let server_sequence: u32 = rand::random();
            let resend = ResendTask::spawn(
                self.transport.clone(),
                peer,
                Segment::syn_ack(server_sequence, client_sequence.wrapping_add(1)),
                self.config.control_policy(),
                None,
            );

            debug!("SYN 수신: {} (isn {})", peer, client_sequence);
            self.pending.insert(
                peer,
                PendingHandshake {
                    client_sequence,
                    server_sequence,
                    started: Instant::now(),
                    resend,
                },
            );
            return Ok(());
        }

        debug!("알 수 없는 피어 세그먼트 폐기 ({}): {}", peer, segment);
        Ok(())
    }

    /// 핸드쉐이크 완료 -> 수립된 연결
    async fn promote(&mut self, peer: SocketAddr) {
        let Some(pending) = self.pending.remove(&peer) else {
            return;
        };
        let local_sequence = pending.server_sequence.wrapping_add(1);
        let peer_sequence = pending.client_sequence.wrapping_add(1);
        pending.resend.shutdown().await;

        let conn = ServerConnection::new(
            self.transport.clone(),
            peer,
            self.config.clone(),
            local_sequence,
            peer_sequence,
        );
        self.connections.insert(peer, Connection::Server(conn));
        self.order.push(peer);
        info!("연결 수립: {} ({} established)", peer, self.connections.len());

        self.check_capacity();
    }

    fn check_capacity(&mut self) {
        if let Some(max) = self.config.max_connections {
            if self.accepting && self.connections.len() >= max {
                info!("최대 연결 수 도달: {}", max);
                self.accepting = false;
            }
        }
    }

    /// 오래된 핸드쉐이크 폐기
    fn expire_pending(&mut self) {
        let timeout = self.config.handshake_timeout;
        self.pending.retain(|peer, pending| {
            let alive = pending.started.elapsed() < timeout;
            if !alive {
                warn!("핸드쉐이크 시간 초과: {}", peer);
            }
            alive
        });
    }

    /// 타이머 처리 후 닫힌 연결 제거
    async fn sweep(&mut self) {
        let mut finished = Vec::new();
        for (peer, conn) in self.connections.iter_mut() {
            if let Err(e) = conn.on_idle() {
                warn!("연결 정리 ({}): {}", peer, e);
            }
            if conn.is_closed() {
                finished.push(*peer);
            }
        }

        for peer in finished {
            self.drop_connection(peer).await;
        }
    }

    async fn drop_connection(&mut self, peer: SocketAddr) {
        if let Some(mut conn) = self.connections.remove(&peer) {
            conn.shutdown().await;
            debug!("연결 제거: {} ({})", peer, conn.status());
        }
    }

    /// 모든 재전송 태스크 취소 후 종료 대기
    pub async fn shutdown(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.resend.shutdown().await;
        }
        for (_, mut conn) in self.connections.drain() {
            conn.shutdown().await;
        }
    }
}
