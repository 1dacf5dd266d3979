//! RFT 서버 (송신자)
//!
//! 클라이언트 핸드쉐이크를 받은 뒤 수립된 모든 클라이언트에 같은 파일을 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin rft-server -- <PORT> <FILE> [OPTIONS]
//!
//! 예시:
//!   # Ctrl+C 까지 연결을 받고 동시 전송
//!   cargo run --release --bin rft-server -- 9000 data.bin
//!
//!   # 클라이언트 2개가 붙으면 바로 순차 전송, 10% 손실 시뮬레이션
//!   cargo run --release --bin rft-server -- 9000 data.bin --max-clients 2 --sequential --loss-rate 0.1

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::{Config, ConnectionManager, Error, FileSource, TransferMode};

/// RFT 서버 - UDP 위의 신뢰성 파일 전송 (송신측)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 수신 대기 포트
    port: u16,

    /// 전송할 파일
    file: PathBuf,

    /// 바인드 주소
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// 한 클라이언트씩 순서대로 전송
    #[arg(long)]
    sequential: bool,

    /// 이 수만큼 연결되면 수락 중단 후 바로 전송
    #[arg(long)]
    max_clients: Option<usize>,

    /// 송신 손실 시뮬레이션 확률 (0.0 ~ 1.0)
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,

    /// 불안정한 네트워크용 설정 (지수 백오프)
    #[arg(long)]
    unstable: bool,

    /// 디버그 로그
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut config = if args.unstable {
        Config::unstable_network()
    } else {
        Config::default()
    };
    config.max_connections = args.max_clients;
    config.loss_rate = args.loss_rate;
    config.validate()?;

    info!("RFT Server starting...");
    info!("Segment size: {} bytes (payload {})", config.segment_size, config.payload_size());
    info!("Window size: {}", config.window_size);
    info!("Loss rate: {:.1}%", config.loss_rate * 100.0);

    let source = FileSource::open(&args.file, config.payload_size())?;
    info!("Loading file: {:?} ({} bytes, {} chunks)", args.file, source.size(), source.total_chunks());

    let bind_addr = SocketAddr::new(args.host, args.port);
    let mut manager = ConnectionManager::bind(bind_addr, config, source).await?;

    info!("Waiting for clients (Ctrl+C to start transfer)...");
    let stop = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    // 수락을 멈춘 뒤 대기 중 핸드쉐이크를 기다리는 동안의 Ctrl+C
    let abort = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(e) = manager.listen(stop, abort).await {
        error!("Listen aborted: {}", e);
        return Err(e.into());
    }

    let peers = manager.established_peers();
    if peers.is_empty() {
        info!("No clients connected");
        return Ok(());
    }

    info!("Clients:");
    for (i, peer) in peers.iter().enumerate() {
        info!("  {}. {}", i + 1, peer);
    }

    let mode = if args.sequential {
        TransferMode::Sequential
    } else {
        TransferMode::Concurrent
    };

    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    match manager.run(mode, interrupt).await {
        Ok(()) => {
            info!("All transfers finished");
            Ok(())
        }
        Err(Error::Interrupted) => {
            error!("Interrupted, connections closed");
            Err(Error::Interrupted.into())
        }
        Err(e) => {
            manager.shutdown().await;
            Err(e.into())
        }
    }
}
