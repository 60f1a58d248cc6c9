#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::header;
use tokio::io::AsyncReadExt as _;

use wsdriver::client::conn::tls::mock::MockEncryption;
use wsdriver::client::conn::tls::TlsError;
use wsdriver::client::conn::transport::duplex;
use wsdriver::{Client, Configuration, EngineProvider, Error, Stage, StageKind, Target};

mod support;

use support::{client_io, serve, Reply};

fn client<T>(transport: T, encryption: MockEncryption, configuration: Configuration) -> Client<T> {
    Client::builder()
        .with_engine(EngineProvider::current().unwrap())
        .with_configuration(configuration)
        .with_encryption(encryption)
        .with_transport(transport)
        .build()
        .unwrap()
}

fn tls_settings() -> Arc<rustls::ClientConfig> {
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(rustls::RootCertStore::empty())
            .with_no_client_auth(),
    )
}

#[tokio::test]
async fn encrypted_ip_target_uses_default_profile() {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, mut received) = serve(Reply::Upgrade);
    let encryption = MockEncryption::new();
    let client = client(transport, encryption.clone(), Configuration::new());

    let websocket = client
        .upgrade(Target::new("wss", "10.0.0.1", 443))
        .await
        .unwrap();

    assert_eq!(encryption.default_contexts(), 1);
    assert_eq!(encryption.configured_contexts(), 0);
    assert_eq!(encryption.handshakes(), 1);
    assert_eq!(encryption.server_names(), vec![Some("10.0.0.1".to_owned())]);

    assert_eq!(
        websocket.pipeline().kinds(),
        vec![StageKind::Tls, StageKind::Framing]
    );

    let request = received.recv().await.unwrap();
    assert_eq!(request.headers[header::HOST], "10.0.0.1");

    client_io(websocket).await;
}

#[tokio::test]
async fn ip_server_name_fallback() {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, _received) = serve(Reply::Upgrade);
    let encryption = MockEncryption::new().rejecting_ip_server_names();
    let client = client(transport, encryption.clone(), Configuration::new());

    let websocket = client
        .upgrade(Target::new("wss", "10.0.0.1", 443))
        .await
        .unwrap();

    assert_eq!(
        encryption.server_names(),
        vec![Some("10.0.0.1".to_owned()), None]
    );
    assert!(matches!(
        websocket.pipeline().get(StageKind::Tls),
        Some(Stage::Tls { server_name: None })
    ));
    client_io(websocket).await;
}

#[tokio::test]
async fn configured_settings_are_used() {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, _received) = serve(Reply::Upgrade);
    let encryption = MockEncryption::new();
    let client = client(
        transport,
        encryption.clone(),
        Configuration::new().with_tls(tls_settings()),
    );

    let websocket = client
        .upgrade(Target::new("wss", "example.com", 443))
        .await
        .unwrap();

    assert_eq!(encryption.default_contexts(), 0);
    assert_eq!(encryption.configured_contexts(), 1);
    assert!(matches!(
        websocket.pipeline().get(StageKind::Tls),
        Some(Stage::Tls { server_name: Some(name) }) if name == "example.com"
    ));
    client_io(websocket).await;
}

#[tokio::test]
async fn plain_targets_skip_tls() {
    let (transport, _received) = serve(Reply::Upgrade);
    let encryption = MockEncryption::new();
    let client = client(transport, encryption.clone(), Configuration::new());

    let websocket = client
        .upgrade(Target::new("ws", "10.0.0.1", 80))
        .await
        .unwrap();

    assert_eq!(encryption.default_contexts(), 0);
    assert_eq!(encryption.handshakes(), 0);
    assert!(!websocket.pipeline().contains(StageKind::Tls));
    client_io(websocket).await;
}

#[tokio::test]
async fn context_failure_closes_transport() {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, mut incoming) = duplex::pair(1024);
    let encryption = MockEncryption::new().failing_context();
    let client = client(transport, encryption.clone(), Configuration::new());

    let signal = client.connect(Target::new("wss", "example.com", 443), |_| {
        panic!("upgraded without tls")
    });

    let (_address, mut stream) = incoming.accept().await.unwrap();

    let result = signal.await;
    assert!(matches!(
        result,
        Err(Error::Tls(TlsError::NoRootCertificates))
    ));

    let mut buf = Vec::new();
    let read = tokio::time::timeout(support::TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, 0);
    assert_eq!(encryption.handshakes(), 0);
}

#[tokio::test]
async fn server_name_rejection_is_not_retried() {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, _received) = serve(Reply::Upgrade);
    let encryption = MockEncryption::new().rejecting_server_names();
    let client = client(transport, encryption.clone(), Configuration::new());

    let result = client
        .connect(Target::new("wss", "example.com", 443), |_| {
            panic!("upgraded with a rejected server name")
        })
        .await;

    assert!(matches!(
        result,
        Err(Error::Tls(TlsError::InvalidServerName(_)))
    ));
    assert_eq!(encryption.server_names().len(), 1);
}

#[tokio::test]
async fn handshake_failure_never_upgrades() {
    let _ = tracing_subscriber::fmt::try_init();

    let (transport, _received) = serve(Reply::Upgrade);
    let encryption = MockEncryption::new().failing_handshake();
    let client = client(transport, encryption.clone(), Configuration::new());

    let upgrades = Arc::new(AtomicUsize::new(0));
    let counter = upgrades.clone();
    let result = client
        .connect(Target::new("wss", "example.com", 443), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

    assert!(matches!(result, Err(Error::Tls(TlsError::Handshake(_)))));
    assert_eq!(encryption.handshakes(), 1);
    assert_eq!(upgrades.load(Ordering::SeqCst), 0);
}
