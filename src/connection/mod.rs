//! 연결 상태 머신
//!
//! 역할별로 상태와 데이터를 따로 갖고, 공통 동작은 [`Connection`] 이 위임한다.

mod client;
mod server;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;

use crate::socket::Received;
use crate::stats::TransferStats;
use crate::Result;

pub use client::{ClientConnection, ClientState};
pub use server::{ServerConnection, ServerState};

/// 역할별 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Client(ClientState),
    Server(ServerState),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Client(state) => write!(f, "client/{}", state),
            Status::Server(state) => write!(f, "server/{}", state),
        }
    }
}

/// 피어 하나와의 논리 연결
#[derive(Debug)]
pub enum Connection {
    Client(ClientConnection),
    Server(ServerConnection),
}

impl Connection {
    pub async fn handle_message(&mut self, segment: crate::segment::Segment) -> Result<()> {
        match self {
            Connection::Client(conn) => conn.handle_message(segment).await,
            Connection::Server(conn) => conn.handle_message(segment).await,
        }
    }

    /// 수신이 없을 때도 주기적으로 호출 (종료 대기, 피어 타임아웃)
    pub fn on_idle(&mut self) -> Result<()> {
        match self {
            Connection::Client(conn) => conn.on_idle(),
            Connection::Server(conn) => conn.on_idle(),
        }
    }

    /// 능동 종료 시작
    pub async fn close(&mut self) -> Result<()> {
        match self {
            Connection::Client(conn) => conn.close().await,
            Connection::Server(conn) => {
                conn.close();
                Ok(())
            }
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Connection::Client(conn) => Status::Client(conn.state()),
            Connection::Server(conn) => Status::Server(conn.state()),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        match self {
            Connection::Client(conn) => conn.peer(),
            Connection::Server(conn) => conn.peer(),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.status(),
            Status::Client(ClientState::Closed) | Status::Server(ServerState::Closed)
        )
    }

    pub fn stats(&self) -> TransferStats {
        match self {
            Connection::Client(conn) => conn.stats().clone(),
            Connection::Server(conn) => conn.stats(),
        }
    }

    /// 재전송 태스크를 모두 멈추고 종료 대기
    pub async fn shutdown(&mut self) {
        match self {
            Connection::Client(conn) => conn.shutdown().await,
            Connection::Server(conn) => conn.shutdown().await,
        }
    }

    /// 연결이 닫힐 때까지 소켓을 단독으로 읽으며 구동
    ///
    /// 소켓을 다른 연결과 공유할 때는 [`crate::ConnectionManager`] 를 쓴다.
    /// 에러로 끝나도 재전송 태스크는 정리된다.
    pub async fn drive(&mut self, receive_timeout: Duration) -> Result<()> {
        let result = self.drive_inner(receive_timeout).await;
        self.shutdown().await;
        result
    }

    async fn drive_inner(&mut self, receive_timeout: Duration) -> Result<()> {
        let transport = match self {
            Connection::Client(conn) => conn.transport().clone(),
            Connection::Server(conn) => conn.transport().clone(),
        };
        let peer = self.peer();

        while !self.is_closed() {
            match transport.receive(receive_timeout).await? {
                Received::Segment(from, segment) if from == peer => {
                    self.handle_message(segment).await?;
                }
                Received::Segment(from, segment) => {
                    debug!("다른 피어의 세그먼트 무시 ({}): {}", from, segment);
                }
                Received::NoData => {}
            }
            self.on_idle()?;
        }

        Ok(())
    }
}
