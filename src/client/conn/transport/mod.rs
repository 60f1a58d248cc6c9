//! Transports for connecting to remote servers.
//!
//! Transports are responsible for establishing a connection to a remote server
//! and shuffling bytes back and forth. Anything which is a [`tower::Service`]
//! accepting an [`Address`] and returning an [`Io`] stream is a [`Transport`].
//!
//! Two builtin transports are provided:
//! - [`Bootstrap`][tcp::Bootstrap]: connects over TCP, using a natively
//!   configured socket where the platform allows it.
//! - [`DuplexTransport`][duplex::DuplexTransport]: connects over an in-memory
//!   duplex stream, for tests or embedding.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::BoxError;

pub mod duplex;
#[cfg(any(test, feature = "mocks"))]
pub mod mock;
pub mod tcp;

/// The remote address a transport connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: Box<str>,
    port: u16,
}

impl Address {
    /// Create an address from a host name or IP literal and a port.
    pub fn new(host: impl Into<Box<str>>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A bidirectional byte stream produced by a transport.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// The address of the remote peer, when the stream has one.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A type-erased [`Io`] stream. Pipeline stages wrap and replace it.
pub type BoxIo = Box<dyn Io>;

impl Io for BoxIo {
    fn peer_addr(&self) -> Option<SocketAddr> {
        (**self).peer_addr()
    }
}

impl Io for tokio::net::TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        tokio::net::TcpStream::peer_addr(self).ok()
    }
}

impl Io for tokio::io::DuplexStream {}

impl<IO> Io for tokio_rustls::client::TlsStream<IO>
where
    IO: Io,
{
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr()
    }
}

/// A transport which connects to an [`Address`].
///
/// This is implemented for every suitable [`tower::Service`], and exists to
/// name the bounds the client relies on.
pub trait Transport: Clone + Send + Sync + 'static {
    /// The stream produced by this transport.
    type IO: Io;

    /// Error returned when a connection cannot be made.
    type Error: Into<BoxError>;

    /// Future returned by [`Transport::connect`].
    type Future: Future<Output = Result<Self::IO, Self::Error>> + Send + 'static;

    /// Connect to the given address.
    fn connect(&mut self, address: Address) -> Self::Future;

    /// Poll the transport to see if it is ready to accept a new connection.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>>;
}

impl<T, IO> Transport for T
where
    T: tower::Service<Address, Response = IO> + Clone + Send + Sync + 'static,
    T::Error: Into<BoxError>,
    T::Future: Send + 'static,
    IO: Io,
{
    type IO = IO;
    type Error = <T as tower::Service<Address>>::Error;
    type Future = <T as tower::Service<Address>>::Future;

    fn connect(&mut self, address: Address) -> <T as tower::Service<Address>>::Future {
        tower::Service::call(self, address)
    }

    fn poll_ready(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), <T as tower::Service<Address>>::Error>> {
        tower::Service::poll_ready(self, cx)
    }
}

/// Wait for the transport to become ready, then connect.
pub(crate) async fn connect<T>(mut transport: T, address: Address) -> Result<T::IO, BoxError>
where
    T: Transport,
{
    futures_util::future::poll_fn(|cx| transport.poll_ready(cx))
        .await
        .map_err(Into::into)?;
    transport.connect(address).await.map_err(Into::into)
}
