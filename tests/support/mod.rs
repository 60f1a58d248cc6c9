//! An in-memory WebSocket upgrade server for integration tests.
#![allow(dead_code)]

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{StatusCode, Uri};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _, DuplexStream};
use tokio::sync::mpsc;

use wsdriver::client::conn::accept_key;
use wsdriver::client::conn::transport::duplex::{self, DuplexIncoming, DuplexTransport};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// How the server answers upgrade requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Upgrade, send `hello`, then expect `world`.
    Upgrade,
    /// Answer `403 Forbidden`.
    Forbidden,
    /// Switch protocols with the wrong accept key.
    BadAccept,
}

/// The head of a request the server received.
#[derive(Debug)]
pub struct Received {
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// Start a server answering every connection with `reply`.
pub fn serve(reply: Reply) -> (DuplexTransport, mpsc::UnboundedReceiver<Received>) {
    let (transport, incoming) = duplex::pair(1024);
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(accept_loop(incoming, reply, tx));
    (transport, rx)
}

async fn accept_loop(
    mut incoming: DuplexIncoming,
    reply: Reply,
    received: mpsc::UnboundedSender<Received>,
) {
    while let Some((address, stream)) = incoming.accept().await {
        tracing::trace!(%address, "[server] accepted connection");
        tokio::spawn(tokio::time::timeout(
            TIMEOUT,
            serve_connection(stream, reply, received.clone()),
        ));
    }
}

async fn serve_connection(
    stream: DuplexStream,
    reply: Reply,
    received: mpsc::UnboundedSender<Received>,
) -> Result<(), BoxError> {
    let service = hyper::service::service_fn(move |request| {
        let received = received.clone();
        async move { respond(request, reply, received) }
    });

    hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await?;

    Ok(())
}

fn respond(
    mut request: http::Request<Incoming>,
    reply: Reply,
    received: mpsc::UnboundedSender<Received>,
) -> Result<http::Response<Empty<Bytes>>, Infallible> {
    let _ = received.send(Received {
        uri: request.uri().clone(),
        headers: request.headers().clone(),
    });

    let key = request.headers().get(header::SEC_WEBSOCKET_KEY).cloned();
    let accept = match (reply, key) {
        (Reply::Upgrade, Some(key)) => accept_key(key.as_bytes()),
        (Reply::BadAccept, Some(_)) => "bm90IHRoZSBhY2NlcHQga2V5".to_owned(),
        _ => {
            return Ok(http::Response::builder()
                .status(StatusCode::FORBIDDEN)
                .body(Empty::new())
                .unwrap())
        }
    };

    if reply == Reply::Upgrade {
        tokio::spawn(async move {
            let upgraded = hyper::upgrade::on(&mut request)
                .await
                .expect("[server] upgrade error");
            upgraded_io(upgraded)
                .await
                .expect("[server] upgraded protocol error");
        });
    }

    Ok(http::Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, HeaderValue::from_static("websocket"))
        .header(header::CONNECTION, HeaderValue::from_static("Upgrade"))
        .header(header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(Empty::new())
        .unwrap())
}

async fn upgraded_io(upgraded: hyper::upgrade::Upgraded) -> Result<(), BoxError> {
    let mut upgraded = TokioIo::new(upgraded);
    upgraded.write_all(b"hello").await?;
    upgraded.flush().await?;

    let mut buf = [0; 5];
    upgraded.read_exact(&mut buf).await?;
    if &buf != b"world" {
        return Err(format!("unexpected message: {:?}", String::from_utf8_lossy(&buf)).into());
    }
    Ok(())
}

/// Exchange the test messages from the client side of an upgraded connection.
pub async fn client_io<IO>(mut io: IO)
where
    IO: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut buf = [0; 5];
    io.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");
    io.write_all(b"world").await.unwrap();
    io.flush().await.unwrap();
}
