//! Client connection types.
//!
//! A connection attempt is composed of a transport, an optional TLS layer and
//! the HTTP/1.1 upgrade exchange, each serving a different purpose in the
//! connection lifecycle.
//!
//! ## Transport
//!
//! The transport establishes a connection to the remote server and shuffles
//! bytes back and forth. Transports implement the [`Transport`] trait,
//! effectively making them a service which accepts an [`Address`] and returns a
//! bidirectional stream.
//!
//! ## Encryption
//!
//! For `wss` targets an [`Encryption`] builds a TLS context and a per-connection
//! handler which wraps the transport stream.
//!
//! ## Pipeline
//!
//! Each connection records its stages in a [`Pipeline`], which is reshaped when
//! the upgrade completes and handed to the caller with the [`WebSocket`].

pub(crate) mod handshake;
pub mod negotiator;
pub mod pipeline;
pub mod tls;
pub mod transport;
pub mod upgrade;

pub use self::negotiator::{accept_key, HandshakeKey};
pub use self::pipeline::{Pipeline, PipelineError, Stage, StageKind};
pub use self::tls::{Encryption, RustlsEncryption, TlsError, TlsHandler};
pub use self::transport::duplex::{DuplexIncoming, DuplexTransport};
pub use self::transport::tcp::{Bootstrap, TcpConfig};
pub use self::transport::{Address, BoxIo, Io, Transport};
pub use self::upgrade::WebSocket;
