//! TCP transports for client connections.
//!
//! The [`Bootstrap`] is the transport a [`Client`][crate::Client] uses unless
//! another one is supplied. It is provisioned against the client's runtime by
//! probing, in order, for a natively configured socket transport and then for
//! the generic tokio TCP transport. The first available one wins.
//!
//! Either way, Nagle's algorithm is disabled on every connected stream.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tracing::{trace, warn, Instrument};

use super::Address;

type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// The timeout for connecting to a remote address. There is none by
    /// default: a hung connect stays pending until the operating system fails it.
    pub connect_timeout: Option<Duration>,

    /// The TCP keep-alive interval, applied to natively configured sockets.
    pub keep_alive_timeout: Option<Duration>,

    /// The size of the send buffer.
    pub send_buffer_size: Option<usize>,

    /// The size of the receive buffer.
    pub recv_buffer_size: Option<usize>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            keep_alive_timeout: Some(Duration::from_secs(90)),
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

/// Error type for TCP connections.
#[derive(Debug, Error)]
pub struct TcpConnectionError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TcpConnectionError {
    pub(super) fn new<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub(super) fn msg<S, E>(message: S) -> impl FnOnce(E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        move |error| Self {
            message: message.into(),
            source: Some(error.into()),
        }
    }
}

impl fmt::Display for TcpConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref source) = self.source {
            write!(f, "{}: {}", self.message, source)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Which transport capability a [`Bootstrap`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Sockets opened and configured through the platform socket API.
    NativeSocket,

    /// Tokio's portable TCP connect.
    GenericTcp,
}

/// The default TCP transport, selected at runtime.
#[derive(Debug, Clone)]
pub enum Bootstrap {
    /// Natively configured sockets.
    Native(NativeSocketTransport),

    /// Portable tokio TCP.
    Generic(GenericTcpTransport),
}

type Candidate = fn(&Handle, &TcpConfig) -> Option<Bootstrap>;

impl Bootstrap {
    /// Select a transport for the given runtime.
    ///
    /// # Panics
    ///
    /// Panics if no transport capability is available. This is a configuration
    /// error which no connection attempt could recover from.
    pub fn provision(handle: &Handle, config: TcpConfig) -> Self {
        let candidates: [Candidate; 2] = [
            |handle, config| {
                NativeSocketTransport::available(handle, config).map(Bootstrap::Native)
            },
            |handle, config| {
                GenericTcpTransport::available(handle, config).map(Bootstrap::Generic)
            },
        ];

        match candidates.iter().find_map(|candidate| candidate(handle, &config)) {
            Some(bootstrap) => {
                trace!(kind = ?bootstrap.kind(), "transport provisioned");
                bootstrap
            }
            None => panic!("no transport is available for the execution engine"),
        }
    }

    /// The capability in use.
    pub fn kind(&self) -> TransportKind {
        match self {
            Bootstrap::Native(_) => TransportKind::NativeSocket,
            Bootstrap::Generic(_) => TransportKind::GenericTcp,
        }
    }

    /// The runtime whose reactor owns the sockets this transport opens.
    pub fn handle(&self) -> &Handle {
        match self {
            Bootstrap::Native(transport) => &transport.handle,
            Bootstrap::Generic(transport) => &transport.handle,
        }
    }

    /// The TCP configuration.
    pub fn config(&self) -> &TcpConfig {
        match self {
            Bootstrap::Native(transport) => &transport.config,
            Bootstrap::Generic(transport) => &transport.config,
        }
    }
}

impl tower::Service<Address> for Bootstrap {
    type Response = TcpStream;
    type Error = TcpConnectionError;
    type Future = BoxFuture<'static, TcpStream, TcpConnectionError>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, address: Address) -> Self::Future {
        let span = tracing::trace_span!("tcp", host = %address.host(), port = address.port());
        let transport = self.clone();

        Box::pin(
            async move {
                let handle = transport.handle().clone();
                let stream = handle
                    .spawn(
                        async move {
                            match transport {
                                Bootstrap::Native(native) => native.connect(&address).await,
                                Bootstrap::Generic(generic) => generic.connect(&address).await,
                            }
                        }
                        .in_current_span(),
                    )
                    .await
                    .map_err(join_error)??;

                stream
                    .set_nodelay(true)
                    .map_err(TcpConnectionError::msg("tcp set_nodelay error"))?;

                if let Ok(peer_addr) = stream.peer_addr() {
                    trace!(peer.addr = %peer_addr, "tcp connected");
                } else {
                    trace!("tcp connected");
                }

                Ok(stream)
            }
            .instrument(span),
        )
    }
}

/// Transport which opens sockets through `socket2`, applying socket options
/// before connecting.
#[derive(Debug, Clone)]
pub struct NativeSocketTransport {
    handle: Handle,
    config: TcpConfig,
}

impl NativeSocketTransport {
    fn available(handle: &Handle, config: &TcpConfig) -> Option<Self> {
        use socket2::{Domain, Protocol, Socket, Type};

        if !cfg!(any(unix, windows)) {
            return None;
        }

        match Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)) {
            Ok(_) => Some(Self {
                handle: handle.clone(),
                config: config.clone(),
            }),
            Err(error) => {
                trace!(%error, "native socket transport unavailable");
                None
            }
        }
    }

    async fn connect(&self, address: &Address) -> Result<TcpStream, TcpConnectionError> {
        let addrs = resolve(address).await?;

        let mut last = None;
        for addr in addrs {
            match self.connect_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(error) => {
                    trace!(%addr, %error, "connect attempt failed");
                    last = Some(error);
                }
            }
        }

        Err(last.unwrap_or_else(|| TcpConnectionError::new("exhausted connection candidates")))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn connect_addr(&self, addr: SocketAddr) -> Result<TcpStream, TcpConnectionError> {
        use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(TcpConnectionError::msg("tcp open error"))?;
        tracing::trace!("tcp socket opened");

        // Tokio requires O_NONBLOCK on sockets it adopts.
        socket
            .set_nonblocking(true)
            .map_err(TcpConnectionError::msg("tcp set_nonblocking error"))?;

        if let Some(dur) = self.config.keep_alive_timeout {
            let conf = TcpKeepalive::new().with_time(dur);
            if let Err(e) = socket.set_tcp_keepalive(&conf) {
                warn!("tcp set_keepalive error: {}", e);
            }
        }

        if let Some(size) = self.config.send_buffer_size {
            if let Err(e) = socket.set_send_buffer_size(size) {
                warn!("tcp set_buffer_size error: {}", e);
            }
        }

        if let Some(size) = self.config.recv_buffer_size {
            if let Err(e) = socket.set_recv_buffer_size(size) {
                warn!("tcp set_recv_buffer_size error: {}", e);
            }
        }

        let socket = TcpSocket::from_std_stream(socket.into());
        with_timeout(self.config.connect_timeout, socket.connect(addr)).await
    }
}

/// Transport which connects with [`TcpStream::connect`].
#[derive(Debug, Clone)]
pub struct GenericTcpTransport {
    handle: Handle,
    config: TcpConfig,
}

impl GenericTcpTransport {
    fn available(handle: &Handle, config: &TcpConfig) -> Option<Self> {
        Some(Self {
            handle: handle.clone(),
            config: config.clone(),
        })
    }

    async fn connect(&self, address: &Address) -> Result<TcpStream, TcpConnectionError> {
        let addrs = resolve(address).await?;
        with_timeout(
            self.config.connect_timeout,
            TcpStream::connect(addrs.as_slice()),
        )
        .await
    }
}

async fn resolve(address: &Address) -> Result<Vec<SocketAddr>, TcpConnectionError> {
    let addrs = tokio::net::lookup_host((address.host(), address.port()))
        .await
        .map_err(TcpConnectionError::msg("dns resolution"))?
        .collect::<Vec<_>>();

    if addrs.is_empty() {
        return Err(TcpConnectionError::new(format!(
            "no addresses found for {address}"
        )));
    }

    Ok(addrs)
}

fn join_error(error: tokio::task::JoinError) -> TcpConnectionError {
    if error.is_cancelled() {
        TcpConnectionError::msg("tcp connect canceled")(error)
    } else {
        TcpConnectionError::msg("tcp connection panic")(error)
    }
}

async fn with_timeout<F>(
    timeout: Option<Duration>,
    connect: F,
) -> Result<TcpStream, TcpConnectionError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    match timeout {
        Some(dur) => match tokio::time::timeout(dur, connect).await {
            Ok(Ok(s)) => Ok(s),
            Ok(Err(e)) => Err(e),
            Err(e) => {
                tracing::trace!(timeout=?dur, "connection timed out");
                Err(io::Error::new(io::ErrorKind::TimedOut, e))
            }
        },
        None => connect.await,
    }
    .map_err(TcpConnectionError::msg("tcp connect error"))
}
