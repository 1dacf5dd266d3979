//! 서버측 연결 (파일 송신)

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::file::FileSource;
use crate::resend::ResendTask;
use crate::segment::{Segment, SegmentKind};
use crate::sender::SlidingWindowSender;
use crate::socket::Transport;
use crate::stats::{SharedStats, TransferStats};
use crate::{Config, Error, Result};

/// 서버 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Established,
    /// 클라이언트 FIN 수락, 다음 타이머 틱에 FIN-ACK 전송
    CloseWait,
    /// FIN-ACK 재전송하며 마지막 ACK 대기
    WaitingLastAck,
    /// 서버가 먼저 FIN 을 보낸 경우
    WaitingFinAck,
    Closed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 서버 연결 (핸드쉐이크 완료 후 생성)
#[derive(Debug)]
pub struct ServerConnection {
    transport: Transport,
    peer: SocketAddr,
    config: Config,
    state: ServerState,

    /// 다음에 보낼 시퀀스 번호
    local_sequence: u32,

    /// 다음에 기대하는 클라이언트 시퀀스 번호
    peer_sequence: u32,

    sender: Option<SlidingWindowSender>,

    /// FIN / FIN-ACK 재전송
    control: Option<ResendTask>,

    last_heard: Instant,
    stats: SharedStats,
}

impl ServerConnection {
    pub fn new(
        transport: Transport,
        peer: SocketAddr,
        config: Config,
        local_sequence: u32,
        peer_sequence: u32,
    ) -> Self {
        Self {
            transport,
            peer,
            config,
            state: ServerState::Established,
            local_sequence,
            peer_sequence,
            sender: None,
            control: None,
            last_heard: Instant::now(),
            stats: TransferStats::shared(),
        }
    }

    /// 파일 전송 시작
    pub fn begin_transfer(&mut self, source: FileSource) -> Result<()> {
        if self.state != ServerState::Established || self.sender.is_some() {
            return Err(Error::InvalidState("전송은 수립된 연결에서 한 번만 시작 가능"));
        }

        let mut sender = SlidingWindowSender::new(
            source,
            self.transport.clone(),
            self.peer,
            self.local_sequence,
            self.config.window_size,
            self.config.retransmit_policy(),
            self.stats.clone(),
        );
        sender.start()?;

        self.sender = Some(sender);
        self.last_heard = Instant::now();
        Ok(())
    }

    /// 세그먼트 처리
    pub async fn handle_message(&mut self, segment: Segment) -> Result<()> {
        self.last_heard = Instant::now();

        match (self.state, segment.kind()) {
            (ServerState::Closed, _) => {}

            (ServerState::Established, SegmentKind::Ack) => {
                if let Some(sender) = self.sender.as_mut() {
                    sender.on_ack(segment.ack_number)?;
                }
            }

            (ServerState::Established, SegmentKind::Fin) => {
                if segment.sequence_number != self.peer_sequence {
                    warn!("FIN 시퀀스 불일치 from {}: {}", self.peer, segment);
                    return Ok(());
                }
                self.stop_sender();
                self.peer_sequence = self.peer_sequence.wrapping_add(1);
                self.state = ServerState::CloseWait;
                debug!("FIN 수신 from {}", self.peer);
            }

            (ServerState::CloseWait | ServerState::WaitingLastAck, SegmentKind::Ack) => {
                if segment.ack_number == self.local_sequence.wrapping_add(1) {
                    self.finish();
                } else {
                    debug!("마지막 ACK 불일치 from {}: {}", self.peer, segment);
                }
            }

            (ServerState::WaitingFinAck, SegmentKind::FinAck) => {
                if segment.ack_number != self.local_sequence.wrapping_add(1) {
                    debug!("FIN-ACK ack 불일치 from {}: {}", self.peer, segment);
                    return Ok(());
                }
                let ack = Segment::ack(
                    self.local_sequence.wrapping_add(1),
                    segment.sequence_number.wrapping_add(1),
                );
                self.transport.send(self.peer, &ack).await?;
                self.finish();
            }

            // 양쪽이 동시에 FIN 을 보낸 경우 (서버 FIN 재전송은 계속)
            (ServerState::WaitingFinAck, SegmentKind::Fin) => {
                let fin_ack = Segment::fin_ack(self.local_sequence, segment.sequence_number.wrapping_add(1));
                self.transport.send(self.peer, &fin_ack).await?;
            }

            (ServerState::WaitingFinAck, SegmentKind::Ack) => {
                if segment.ack_number == self.local_sequence.wrapping_add(1) {
                    self.finish();
                }
            }

            (state, _) => {
                debug!("{} 상태에서 무시 ({}): {}", state, self.peer, segment);
            }
        }

        Ok(())
    }

    /// FIN-ACK 재전송 시작
    fn send_fin_ack(&mut self) {
        let fin_ack = Segment::fin_ack(self.local_sequence, self.peer_sequence);
        self.control = Some(ResendTask::spawn(
            self.transport.clone(),
            self.peer,
            fin_ack,
            self.config.control_policy(),
            None,
        ));
        self.state = ServerState::WaitingLastAck;
        debug!("FIN-ACK 전송 -> {}", self.peer);
    }

    /// 능동 종료 시작 (FIN 전송)
    pub fn close(&mut self) {
        if self.state != ServerState::Established {
            return;
        }

        self.stop_sender();
        let fin = Segment::fin(self.local_sequence);
        self.control = Some(ResendTask::spawn(
            self.transport.clone(),
            self.peer,
            fin,
            self.config.control_policy(),
            None,
        ));
        self.state = ServerState::WaitingFinAck;
        info!("연결 종료 요청 -> {}", self.peer);
    }

    /// 송신 중단 후 다음 시퀀스 번호 확정
    fn stop_sender(&mut self) {
        if let Some(sender) = self.sender.as_mut() {
            if !sender.is_complete() {
                warn!("전송 미완료 상태로 종료: {} ({}/{})", self.peer, sender.acked(), sender.total_segments());
            }
            sender.cancel_all();
            self.local_sequence = sender.next_sequence();
        }
    }

    /// 타이머 처리
    pub fn on_idle(&mut self) -> Result<()> {
        if self.state == ServerState::CloseWait {
            self.send_fin_ack();
            return Ok(());
        }

        // 전송 시작 전에는 클라이언트가 조용한 게 정상
        let waiting = self.state == ServerState::Established && !self.has_begun();
        if waiting || self.state == ServerState::Closed {
            return Ok(());
        }

        if self.last_heard.elapsed() > self.config.peer_timeout {
            warn!("클라이언트 응답 없음: {} ({})", self.peer, self.state);
            self.stop_sender();
            self.finish();
            return Err(Error::PeerTimeout(self.peer));
        }

        Ok(())
    }

    fn finish(&mut self) {
        if let Some(task) = self.control.take() {
            task.cancel();
        }
        if let Some(sender) = self.sender.as_mut() {
            sender.cancel_all();
        }
        if self.state != ServerState::Closed {
            self.state = ServerState::Closed;
            info!("연결 종료: {} | {}", self.peer, self.stats.lock());
        }
    }

    /// 재전송 태스크 정리
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.control.take() {
            task.shutdown().await;
        }
        if let Some(sender) = self.sender.as_mut() {
            sender.shutdown().await;
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn local_sequence(&self) -> u32 {
        self.local_sequence
    }

    pub fn peer_sequence(&self) -> u32 {
        self.peer_sequence
    }

    /// 전송을 시작했는지
    pub fn has_begun(&self) -> bool {
        self.sender.is_some()
    }

    /// 모든 세그먼트가 확인되었는지
    pub fn is_transfer_complete(&self) -> bool {
        self.sender.as_ref().is_some_and(SlidingWindowSender::is_complete)
    }

    pub fn stats(&self) -> TransferStats {
        self.stats.lock().clone()
    }
}
