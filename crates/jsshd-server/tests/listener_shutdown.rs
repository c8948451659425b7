//! Listener lifecycle: banner and shutdown

use std::sync::Arc;
use std::time::Duration;

use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::Algorithm;
use russh::keys::PrivateKey;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use jsshd_core::config::SshdConfig;
use jsshd_server::auth::TrustMaterial;
use jsshd_server::directory::SystemDirectory;
use jsshd_server::logs::FileLogManager;
use jsshd_server::server::SshServer;
use jsshd_server::session::NativeSpawner;
use jsshd_server::ServerState;

fn state(logs: &TempDir) -> Arc<ServerState> {
    let config = SshdConfig {
        log_dir: Some(logs.path().to_path_buf()),
        ..SshdConfig::default()
    };
    Arc::new(ServerState::with_parts(
        config,
        Arc::new(SystemDirectory::new()),
        TrustMaterial::none(),
        Arc::new(FileLogManager::new(logs.path())),
        Arc::new(NativeSpawner),
    ))
}

fn host_key() -> PrivateKey {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()
}

#[tokio::test]
async fn test_banner_then_shutdown() {
    let logs = TempDir::new().unwrap();
    let state = state(&logs);
    let server = SshServer::new(host_key(), Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = tokio::spawn(async move { server.serve(listener).await });

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut banner = String::new();
    tokio::time::timeout(
        Duration::from_secs(5),
        BufReader::new(stream).read_line(&mut banner),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(banner.trim_end(), state.config.server_id());

    assert!(state.shutdown.trigger("test"));
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_second_trigger_is_ignored() {
    let logs = TempDir::new().unwrap();
    let state = state(&logs);
    let server = SshServer::new(host_key(), Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let serving = tokio::spawn(async move { server.serve(listener).await });

    assert!(state.shutdown.trigger("first"));
    assert!(!state.shutdown.trigger("second"));
    tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(state.shutdown.is_triggered());
}
