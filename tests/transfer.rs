//! 루프백 UDP 위의 종단 간 전송 테스트

use std::future::pending;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use rft::{ClientConnection, ClientState, Config, Connection, ConnectionManager, FileSource, TransferMode, Transport};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

async fn start_server(
    config: Config,
    data: Vec<u8>,
    mode: TransferMode,
) -> (SocketAddr, tokio::task::JoinHandle<rft::Result<()>>) {
    let source = FileSource::from_bytes("payload.bin", data, config.payload_size()).unwrap();
    let mut manager = ConnectionManager::bind(loopback(), config, source).await.unwrap();
    let addr = manager.local_addr();

    let handle = tokio::spawn(async move {
        manager.listen(pending::<()>(), pending::<()>()).await?;
        manager.run(mode, pending::<()>()).await
    });

    (addr, handle)
}

async fn receive_file(server: SocketAddr, output_dir: &Path, config: Config) -> ClientConnection {
    let transport = Transport::bind(loopback()).await.unwrap().with_loss_rate(config.loss_rate);
    let timeout = config.receive_timeout;

    let mut client = ClientConnection::new(transport, server, config, output_dir);
    client.connect().await.unwrap();

    let mut conn = Connection::Client(client);
    conn.drive(timeout).await.unwrap();

    match conn {
        Connection::Client(client) => client,
        Connection::Server(_) => panic!("expected client connection"),
    }
}

async fn run_transfer(clients: usize, mode: TransferMode, loss_rate: f64, size: usize) {
    let mut config = Config::low_latency();
    config.max_connections = Some(clients);
    config.loss_rate = loss_rate;

    let data = test_data(size);
    let (server, server_task) = start_server(config.clone(), data.clone(), mode).await;

    let dirs: Vec<_> = (0..clients).map(|_| tempfile::tempdir().unwrap()).collect();
    let mut handles = Vec::new();
    for dir in &dirs {
        let path = dir.path().to_path_buf();
        let config = config.clone();
        handles.push(tokio::spawn(async move { receive_file(server, &path, config).await }));
    }

    let finished = tokio::time::timeout(Duration::from_secs(60), async {
        for handle in handles {
            let client = handle.await.unwrap();
            assert!(client.is_transfer_complete());
            assert_eq!(client.state(), ClientState::Closed);
        }
        server_task.await.unwrap().unwrap();
    })
    .await;
    assert!(finished.is_ok(), "transfer timed out");

    for dir in &dirs {
        let received = std::fs::read(dir.path().join("payload.bin")).unwrap();
        assert_eq!(received, data);
    }
}

#[tokio::test]
async fn test_single_client_transfer() {
    run_transfer(1, TransferMode::Concurrent, 0.0, 50_000).await;
}

#[tokio::test]
async fn test_empty_file_transfer() {
    run_transfer(1, TransferMode::Concurrent, 0.0, 0).await;
}

#[tokio::test]
async fn test_sequential_transfer() {
    run_transfer(3, TransferMode::Sequential, 0.0, 30_000).await;
}

#[tokio::test]
async fn test_concurrent_transfer() {
    run_transfer(3, TransferMode::Concurrent, 0.0, 30_000).await;
}

#[tokio::test]
async fn test_transfer_with_loss() {
    run_transfer(2, TransferMode::Concurrent, 0.1, 40_000).await;
}

#[tokio::test]
async fn test_sequential_transfer_with_loss() {
    run_transfer(2, TransferMode::Sequential, 0.1, 20_000).await;
}
