//! RFT 클라이언트 (수신자)
//!
//! 서버에 연결해 파일 하나를 받고 연결을 닫는다.
//!
//! 사용법:
//!   cargo run --release --bin rft-client -- <CLIENT_PORT> <SERVER_PORT> <OUTPUT_DIR> [OPTIONS]
//!
//! 예시:
//!   # 로컬 서버에서 수신
//!   cargo run --release --bin rft-client -- 9001 9000 ./downloads
//!
//!   # 원격 서버 + 손실 시뮬레이션
//!   cargo run --release --bin rft-client -- 9001 9000 ./downloads --host 192.168.1.100 --loss-rate 0.05

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rft::{ClientConnection, Config, Connection, Error, Transport};

/// RFT 클라이언트 - UDP 위의 신뢰성 파일 전송 (수신측)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// 로컬 포트
    client_port: u16,

    /// 서버 포트
    server_port: u16,

    /// 수신 파일 저장 디렉토리
    output_dir: PathBuf,

    /// 서버 주소
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// 송신 손실 시뮬레이션 확률 (0.0 ~ 1.0)
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,

    /// 불안정한 네트워크용 설정
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
    config.loss_rate = args.loss_rate;
    config.validate()?;

    if !args.output_dir.is_dir() {
        std::fs::create_dir_all(&args.output_dir)?;
    }

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), args.client_port);
    let server_addr = SocketAddr::new(args.host, args.server_port);

    info!("RFT Client starting...");
    info!("Server address: {}", server_addr);

    let transport = Transport::bind(bind_addr).await?.with_loss_rate(config.loss_rate);
    info!("Bound to local address: {}", transport.local_addr());

    let receive_timeout = config.receive_timeout;
    let mut client = ClientConnection::new(transport, server_addr, config, &args.output_dir);

    let result = tokio::select! {
        result = async {
            client.connect().await?;
            let mut conn = Connection::Client(client);
            let result = conn.drive(receive_timeout).await;
            result.map(|_| conn)
        } => result,
        _ = tokio::signal::ctrl_c() => Err(Error::Interrupted),
    };

    match result {
        Ok(Connection::Client(client)) if client.is_transfer_complete() => {
            info!(
                "Saved: {:?} ({} bytes)",
                client.receiver().output_path(),
                client.receiver().bytes_written()
            );
            info!("{}", client.stats());
            Ok(())
        }
        Ok(_) => {
            warn!("Connection closed before the transfer completed");
            Err(Error::ConnectionClosed.into())
        }
        Err(e) => {
            error!("Transfer failed: {}", e);
            Err(e.into())
        }
    }
}
