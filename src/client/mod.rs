//! WebSocket client.
//!
//! There are two levels of available APIs in this library:
//!
//! 1. The [`Client`] API, which connects to a [`Target`] and hands the upgraded
//!    connection to a callback, or returns it from [`Client::upgrade`].
//! 2. The [connection][self::conn] API, which exposes the transport, TLS and
//!    pipeline layers. This API is useful for implementing custom transports or
//!    encryption, and for inspecting what was negotiated.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use pin_project::pin_project;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use self::conn::handshake::Handshake;
use self::conn::tls::Encryption;
use self::conn::transport::tcp::Bootstrap;
use self::conn::transport::Transport;
use self::conn::upgrade::WebSocket;
use crate::config::Configuration;
use crate::engine::{AlreadyShutdown, Engine};
use crate::Error;

mod builder;
pub mod conn;
mod target;

pub use builder::Builder;
pub use target::{Scheme, Target};

/// A WebSocket client.
///
/// Every attempt made through a client shares its configuration, transport,
/// encryption and engine. Clones share all of them, including the engine, so
/// shutting down one clone shuts down all of them.
pub struct Client<T = Bootstrap> {
    configuration: Arc<Configuration>,
    engine: Arc<Engine>,
    transport: T,
    encryption: Arc<dyn Encryption>,
}

impl<T: Clone> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            configuration: self.configuration.clone(),
            engine: self.engine.clone(),
            transport: self.transport.clone(),
            encryption: self.encryption.clone(),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("configuration", &self.configuration)
            .field("engine", &self.engine)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl Client<Bootstrap> {
    /// Create a client with the default configuration, a dedicated engine and
    /// the TCP transport.
    pub fn new() -> io::Result<Self> {
        Builder::new().build()
    }

    /// A builder for a client.
    pub fn builder() -> Builder<Bootstrap> {
        Builder::new()
    }
}

impl<T> Client<T> {
    pub(crate) fn from_parts(
        configuration: Configuration,
        engine: Engine,
        transport: T,
        encryption: Arc<dyn Encryption>,
    ) -> Self {
        Self {
            configuration: Arc::new(configuration),
            engine: Arc::new(engine),
            transport,
            encryption,
        }
    }

    /// The configuration shared by every attempt.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The engine driving attempts.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The transport used to connect.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Shut down the engine.
    ///
    /// A borrowed engine is left running. An owned engine is stopped, cancelling
    /// any attempt still in flight, and can only be shut down once.
    pub fn shutdown(&self) -> Result<(), AlreadyShutdown> {
        self.engine.shutdown()
    }
}

impl<T> Client<T>
where
    T: Transport,
{
    /// Start a connection attempt to `target`.
    ///
    /// The attempt runs on the engine. When the upgrade succeeds `on_upgrade`
    /// receives the connection, before the returned signal resolves. When any
    /// step fails the signal resolves to the error and `on_upgrade` is dropped
    /// without being called.
    ///
    /// Problems found before any I/O, such as an unknown scheme, resolve the
    /// signal immediately.
    pub fn connect<F>(&self, target: Target, on_upgrade: F) -> CompletionSignal
    where
        F: FnOnce(WebSocket) + Send + 'static,
    {
        if self.engine.is_shutdown() {
            return CompletionSignal::failed(Error::Canceled);
        }

        let handshake = match Handshake::new(
            self.configuration.clone(),
            self.transport.clone(),
            self.encryption.clone(),
            target,
        ) {
            Ok(handshake) => handshake,
            Err(error) => {
                tracing::debug!(%error, "connection attempt rejected");
                return CompletionSignal::failed(error);
            }
        };

        let task = self.engine.handle().spawn(handshake.run(on_upgrade));
        CompletionSignal::pending(task)
    }

    /// Start a connection attempt to a `ws://` or `wss://` URL.
    pub fn connect_url<F>(&self, url: &str, on_upgrade: F) -> CompletionSignal
    where
        F: FnOnce(WebSocket) + Send + 'static,
    {
        match Target::from_url(url) {
            Ok(target) => self.connect(target, on_upgrade),
            Err(error) => CompletionSignal::failed(error),
        }
    }

    /// Connect to `target` and return the upgraded connection.
    pub async fn upgrade(&self, target: Target) -> Result<WebSocket, Error> {
        let (tx, rx) = oneshot::channel();
        self.connect(target, move |websocket| {
            if tx.send(websocket).is_err() {
                tracing::trace!("upgrade receiver dropped");
            }
        })
        .await?;

        rx.await.map_err(|_| Error::Canceled)
    }
}

/// Resolves once a connection attempt has finished.
///
/// Dropping the signal detaches the attempt, which keeps running on the engine.
/// Use [`CompletionSignal::abort`] to cancel it.
#[pin_project]
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct CompletionSignal {
    #[pin]
    inner: SignalState,
}

#[pin_project(project = SignalStateProj)]
#[derive(Debug)]
enum SignalState {
    Ready(Option<Error>),
    Pending(#[pin] JoinHandle<Result<(), Error>>),
}

impl CompletionSignal {
    fn failed(error: Error) -> Self {
        Self {
            inner: SignalState::Ready(Some(error)),
        }
    }

    fn pending(task: JoinHandle<Result<(), Error>>) -> Self {
        Self {
            inner: SignalState::Pending(task),
        }
    }

    /// Cancel the attempt. The signal then resolves to [`Error::Canceled`],
    /// unless the attempt already finished.
    pub fn abort(&self) {
        if let SignalState::Pending(task) = &self.inner {
            task.abort();
        }
    }

    /// Whether the attempt has finished.
    pub fn is_finished(&self) -> bool {
        match &self.inner {
            SignalState::Ready(_) => true,
            SignalState::Pending(task) => task.is_finished(),
        }
    }
}

impl Future for CompletionSignal {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().inner.project() {
            SignalStateProj::Ready(error) => match error.take() {
                Some(error) => Poll::Ready(Err(error)),
                None => panic!("CompletionSignal polled after completion"),
            },
            SignalStateProj::Pending(task) => match ready!(task.poll(cx)) {
                Ok(result) => Poll::Ready(result),
                Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
                Err(_) => Poll::Ready(Err(Error::Canceled)),
            },
        }
    }
}
