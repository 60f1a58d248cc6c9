#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use wsdriver::{AlreadyShutdown, Client, Engine, EngineProvider};

#[test]
fn concurrent_shutdown_succeeds_once() {
    let _ = tracing_subscriber::fmt::try_init();

    let engine = Arc::new(Engine::owned().unwrap());

    let results: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || engine.shutdown())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|result| result.err())
        .all(|error| error == AlreadyShutdown));
    engine.assert_shut_down();
}

#[test]
fn client_shutdown_from_another_thread() {
    let client = Client::new().unwrap();
    assert!(client.engine().is_owned());

    let other = client.clone();
    thread::spawn(move || other.shutdown().unwrap())
        .join()
        .unwrap();

    assert_eq!(client.shutdown(), Err(AlreadyShutdown));
    assert!(client.engine().is_shutdown());
}

#[test]
fn shared_engine_survives_client() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let client = Client::builder()
        .with_engine(EngineProvider::Shared(runtime.handle().clone()))
        .build()
        .unwrap();

    assert!(!client.engine().is_owned());
    client.shutdown().unwrap();
    client.shutdown().unwrap();
    drop(client);

    assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
}

#[test]
fn provider_from_context() {
    assert!(EngineProvider::current().is_none());

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    assert!(matches!(
        EngineProvider::current(),
        Some(EngineProvider::Shared(_))
    ));
}
