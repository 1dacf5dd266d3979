//! 클라이언트측 연결 (파일 수신)

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::receiver::FileReceiver;
use crate::resend::ResendTask;
use crate::segment::{Segment, SegmentKind};
use crate::socket::{Received, Transport};
use crate::stats::TransferStats;
use crate::{Config, Error, Result};

/// 클라이언트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    WaitingSynAck,
    WaitingFirstPacket,
    Established,
    /// 파일을 모두 받음, FIN 전송 전
    ActiveClose,
    WaitingFinAck,
    CloseTimeWait,
    /// 서버가 먼저 FIN 을 보낸 경우
    WaitingLastAck,
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 클라이언트 연결
#[derive(Debug)]
pub struct ClientConnection {
    transport: Transport,
    peer: SocketAddr,
    config: Config,
    state: ClientState,

    /// 다음에 보낼 시퀀스 번호
    local_sequence: u32,

    /// 다음에 기대하는 서버 시퀀스 번호
    peer_sequence: u32,

    receiver: FileReceiver,

    /// FIN / FIN-ACK 재전송
    control: Option<ResendTask>,

    last_heard: Instant,
    deadline: Option<Instant>,
    stats: TransferStats,
}

impl ClientConnection {
    pub fn new(transport: Transport, server: SocketAddr, config: Config, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            peer: server,
            config,
            state: ClientState::Uninitialized,
            local_sequence: 0,
            peer_sequence: 0,
            receiver: FileReceiver::new(output_dir),
            control: None,
            last_heard: Instant::now(),
            deadline: None,
            stats: TransferStats::new(),
        }
    }

    /// 3-way 핸드쉐이크
    ///
    /// 응답이 없으면 SYN 을 계속 재전송한다. 호출측이 취소하지 않는 한 끝나지 않는다.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ClientState::Uninitialized {
            return Err(Error::InvalidState("connect 는 한 번만 호출 가능"));
        }

        self.local_sequence = rand::random();
        let syn = Segment::syn(self.local_sequence);
        self.state = ClientState::WaitingSynAck;
        info!("연결 시도 -> {} (isn {})", self.peer, self.local_sequence);

        loop {
            self.transport.send(self.peer, &syn).await?;
            let deadline = Instant::now() + self.config.control_resend_interval;

            while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                let segment = match self.transport.receive(remaining).await? {
                    Received::Segment(from, segment) if from == self.peer => segment,
                    Received::Segment(from, _) => {
                        debug!("다른 주소의 세그먼트 무시: {}", from);
                        continue;
                    }
                    Received::NoData => break,
                };

                let expected = self.local_sequence.wrapping_add(1);
                if segment.kind() == SegmentKind::SynAck && segment.ack_number == expected {
                    self.local_sequence = expected;
                    self.peer_sequence = segment.sequence_number.wrapping_add(1);
                    self.send_ack().await?;
                    self.state = ClientState::WaitingFirstPacket;
                    self.last_heard = Instant::now();
                    info!("연결 수립: {} (server isn {})", self.peer, segment.sequence_number);
                    return Ok(());
                }

                debug!("핸드쉐이크 중 예상 밖 세그먼트 무시: {}", segment);
            }

            debug!("SYN-ACK 타임아웃, SYN 재전송");
        }
    }

    /// 세그먼트 처리
    pub async fn handle_message(&mut self, segment: Segment) -> Result<()> {
        self.last_heard = Instant::now();
        let kind = segment.kind();

        match (self.state, kind) {
            (ClientState::Closed, _) => {}

            (ClientState::WaitingFirstPacket | ClientState::Established, SegmentKind::Data) => {
                if self.state == ClientState::WaitingFirstPacket {
                    self.state = ClientState::Established;
                    debug!("첫 데이터 수신: {}", self.peer);
                }
                self.handle_data(segment).await?;
            }

            // 마지막 ACK 유실 시 서버가 다시 보낸 SYN-ACK
            (ClientState::WaitingFirstPacket | ClientState::Established, SegmentKind::SynAck) => {
                self.send_ack().await?;
            }

            (ClientState::WaitingFirstPacket | ClientState::Established | ClientState::ActiveClose, SegmentKind::Fin) => {
                self.passive_close(segment).await?;
            }

            // 서버가 마지막 데이터 ACK 를 못 받아 재전송하는 경우
            (ClientState::ActiveClose | ClientState::WaitingFinAck, SegmentKind::Data) => {
                self.stats.duplicate_segments += 1;
                self.send_ack().await?;
            }

            (ClientState::WaitingFinAck, SegmentKind::FinAck) => {
                if segment.ack_number != self.local_sequence.wrapping_add(1) {
                    debug!("FIN-ACK ack 불일치: {}", segment);
                    return Ok(());
                }

                if let Some(task) = self.control.take() {
                    task.cancel();
                }
                self.local_sequence = self.local_sequence.wrapping_add(1);
                self.peer_sequence = segment.sequence_number.wrapping_add(1);
                self.send_ack().await?;

                self.state = ClientState::CloseTimeWait;
                self.deadline = Some(Instant::now() + self.config.close_wait);
                debug!("FIN-ACK 수신, {:?} 대기", self.config.close_wait);
            }

            (ClientState::CloseTimeWait, SegmentKind::FinAck) => {
                self.send_ack().await?;
            }

            (ClientState::WaitingLastAck, SegmentKind::Ack) => {
                if segment.ack_number == self.local_sequence.wrapping_add(1) {
                    self.finish();
                } else {
                    debug!("마지막 ACK 불일치: {}", segment);
                }
            }

            (state, _) => {
                debug!("{} 상태에서 무시: {}", state, segment);
            }
        }

        Ok(())
    }

    async fn handle_data(&mut self, segment: Segment) -> Result<()> {
        let offset = segment.sequence_number.wrapping_sub(self.peer_sequence) as i32;

        if offset < 0 {
            // 이전 ACK 가 유실됨
            self.stats.duplicate_segments += 1;
            return self.send_ack().await;
        }

        if offset > 0 {
            self.stats.out_of_order_segments += 1;
            debug!("순서 어긋난 세그먼트 폐기: {} (expected {})", segment, self.peer_sequence);
            return Ok(());
        }

        let was_started = self.receiver.metadata().is_some();
        self.receiver.deliver(&segment.payload)?;
        if was_started {
            self.stats.total_bytes += segment.payload.len() as u64;
        }
        self.stats.segments_delivered += 1;

        self.peer_sequence = self.peer_sequence.wrapping_add(1);
        self.send_ack().await?;

        if self.receiver.is_complete() {
            info!(
                "수신 완료: {:?} ({} bytes)",
                self.receiver.output_path(),
                self.receiver.bytes_written()
            );
            self.state = ClientState::ActiveClose;
        }

        Ok(())
    }

    async fn passive_close(&mut self, fin: Segment) -> Result<()> {
        info!("서버가 연결 종료 요청: {}", self.peer);
        let fin_ack = Segment::fin_ack(self.local_sequence, fin.sequence_number.wrapping_add(1));
        self.control = Some(ResendTask::spawn(
            self.transport.clone(),
            self.peer,
            fin_ack,
            self.config.control_policy(),
            None,
        ));
        self.state = ClientState::WaitingLastAck;
        self.deadline = Some(Instant::now() + self.config.close_wait);
        Ok(())
    }

    /// 능동 종료 시작 (FIN 전송)
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            ClientState::WaitingFirstPacket | ClientState::Established | ClientState::ActiveClose => {
                self.send_fin();
            }
            ClientState::Uninitialized | ClientState::WaitingSynAck => self.finish(),
            _ => {}
        }
        Ok(())
    }

    fn send_fin(&mut self) {
        let fin = Segment::fin(self.local_sequence);
        self.control = Some(ResendTask::spawn(
            self.transport.clone(),
            self.peer,
            fin,
            self.config.control_policy(),
            None,
        ));
        self.state = ClientState::WaitingFinAck;
        debug!("FIN 전송 -> {}", self.peer);
    }

    /// 타이머 처리
    pub fn on_idle(&mut self) -> Result<()> {
        let now = Instant::now();

        match self.state {
            ClientState::ActiveClose => self.send_fin(),
            ClientState::CloseTimeWait | ClientState::WaitingLastAck => {
                if self.deadline.is_some_and(|d| now >= d) {
                    if self.state == ClientState::WaitingLastAck {
                        warn!("마지막 ACK 없이 종료: {}", self.peer);
                    }
                    self.finish();
                }
            }
            ClientState::Established | ClientState::WaitingFinAck => {
                if now.duration_since(self.last_heard) > self.config.peer_timeout {
                    warn!("서버 응답 없음: {}", self.peer);
                    self.finish();
                    return Err(Error::PeerTimeout(self.peer));
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn finish(&mut self) {
        if let Some(task) = self.control.take() {
            task.cancel();
        }
        if self.state != ClientState::Closed {
            self.state = ClientState::Closed;
            info!("연결 종료: {} | {}", self.peer, self.stats);
        }
    }

    /// 현재 누적 ACK 전송
    async fn send_ack(&self) -> Result<()> {
        self.transport
            .send(self.peer, &Segment::ack(self.local_sequence, self.peer_sequence))
            .await
    }

    /// 재전송 태스크 정리
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.control.take() {
            task.shutdown().await;
        }
    }

    pub fn state(&self) -> ClientState {
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

    pub fn receiver(&self) -> &FileReceiver {
        &self.receiver
    }

    /// 파일을 끝까지 받았는지
    pub fn is_transfer_complete(&self) -> bool {
        self.receiver.is_complete()
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }
}
