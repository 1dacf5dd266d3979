//! 프로토콜 설정

use std::time::Duration;

use crate::metadata::{METADATA_HEADER_SIZE, MAX_EXTENSION_CHARS, MAX_FILENAME_CHARS};
use crate::resend::{Backoff, ResendPolicy};
use crate::{Error, Result, DEFAULT_SEGMENT_SIZE, HEADER_SIZE, MAX_DATAGRAM_SIZE};

/// RFT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 세그먼트 크기 (FEC 적용 전, 헤더 포함)
    pub segment_size: usize,

    /// 동시에 전송 중일 수 있는 데이터 세그먼트 수
    pub window_size: usize,

    /// 데이터 세그먼트 재전송 간격
    pub retransmit_backoff: Backoff,

    /// 데이터 세그먼트당 최대 전송 횟수 (최초 전송 포함)
    pub max_transmissions: u32,

    /// SYN-ACK / FIN / FIN-ACK 재전송 간격
    pub control_resend_interval: Duration,

    /// 수신 대기 타임아웃
    pub receive_timeout: Duration,

    /// 마지막 ACK 이후 클라이언트 대기 시간
    pub close_wait: Duration,

    /// 미완료 핸드쉐이크 폐기 시간
    pub handshake_timeout: Duration,

    /// 수립된 연결에서 피어 무응답 허용 시간
    pub peer_timeout: Duration,

    /// 이 수만큼 연결이 수립되면 새 연결 수락 중단
    pub max_connections: Option<usize>,

    /// 송신 시 패킷 손실 시뮬레이션 확률 (0.0 ~ 1.0)
    pub loss_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            window_size: 4,
            retransmit_backoff: Backoff::Fixed(Duration::from_millis(250)),
            max_transmissions: 10,
            control_resend_interval: Duration::from_secs(1),
            receive_timeout: Duration::from_secs(1),
            close_wait: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(30),
            peer_timeout: Duration::from_secs(30),
            max_connections: None,
            loss_rate: 0.0,
        }
    }
}

impl Config {
    /// 세그먼트당 페이로드 크기
    pub fn payload_size(&self) -> usize {
        self.segment_size.saturating_sub(HEADER_SIZE)
    }

    /// 데이터 세그먼트 재전송 정책
    pub fn retransmit_policy(&self) -> ResendPolicy {
        ResendPolicy {
            backoff: self.retransmit_backoff,
            max_attempts: Some(self.max_transmissions),
        }
    }

    /// 제어 세그먼트 재전송 정책 (취소될 때까지 고정 간격)
    pub fn control_policy(&self) -> ResendPolicy {
        ResendPolicy {
            backoff: Backoff::Fixed(self.control_resend_interval),
            max_attempts: None,
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::InvalidConfig("window_size 는 1 이상".into()));
        }

        // 가장 긴 메타데이터도 한 세그먼트에 들어가야 함
        let max_metadata = METADATA_HEADER_SIZE + 4 * (MAX_FILENAME_CHARS + MAX_EXTENSION_CHARS);
        if self.payload_size() < max_metadata {
            return Err(Error::InvalidConfig(format!(
                "segment_size {} 너무 작음 (최소 {})",
                self.segment_size,
                HEADER_SIZE + max_metadata
            )));
        }

        if self.segment_size * 2 > MAX_DATAGRAM_SIZE {
            return Err(Error::InvalidConfig(format!(
                "segment_size {} 의 FEC 인코딩 크기가 UDP 한계 {} 초과",
                self.segment_size, MAX_DATAGRAM_SIZE
            )));
        }

        if self.max_transmissions == 0 {
            return Err(Error::InvalidConfig("max_transmissions 는 1 이상".into()));
        }

        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(Error::InvalidConfig(format!(
                "loss_rate {} 는 [0, 1) 범위여야 함",
                self.loss_rate
            )));
        }

        Ok(())
    }

    /// 로컬/테스트용 설정 (짧은 타임아웃)
    pub fn low_latency() -> Self {
        Self {
            segment_size: 4096,
            window_size: 4,
            retransmit_backoff: Backoff::Fixed(Duration::from_millis(40)),
            max_transmissions: 25,
            control_resend_interval: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(50),
            close_wait: Duration::from_millis(300),
            handshake_timeout: Duration::from_secs(5),
            peer_timeout: Duration::from_secs(5),
            max_connections: None,
            loss_rate: 0.0,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            segment_size: 8192,
            window_size: 8,
            retransmit_backoff: Backoff::Exponential {
                initial: Duration::from_millis(200),
                max: Duration::from_secs(2),
            },
            max_transmissions: 20,
            control_resend_interval: Duration::from_millis(500),
            receive_timeout: Duration::from_millis(500),
            close_wait: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(60),
            peer_timeout: Duration::from_secs(60),
            max_connections: None,
            loss_rate: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        Config::default().validate().unwrap();
        Config::low_latency().validate().unwrap();
        Config::unstable_network().validate().unwrap();
    }

    #[test]
    fn test_payload_size() {
        let config = Config::default();
        assert_eq!(config.payload_size(), DEFAULT_SEGMENT_SIZE - HEADER_SIZE);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = Config::default();
        config.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.segment_size = 40_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.segment_size = 64;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.loss_rate = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policies() {
        let config = Config::default();
        assert_eq!(config.retransmit_policy().max_attempts, Some(10));
        assert_eq!(config.control_policy().max_attempts, None);
    }
}
