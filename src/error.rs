//! Errors which resolve a connection attempt.

use thiserror::Error;

use crate::client::conn::pipeline::PipelineError;
use crate::client::conn::tls::TlsError;
use crate::BoxError;

/// Client error type.
///
/// Every failure during a connection attempt, regardless of the stage where it
/// happened, is reported through this type on the attempt's
/// [`CompletionSignal`][crate::CompletionSignal].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The URL could not be parsed into a connection target.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The scheme is neither `ws` nor `wss`.
    #[error("invalid scheme: {0:?}")]
    InvalidScheme(String),

    /// The configured maximum frame size is zero or does not fit in 32 bits.
    #[error("invalid max frame size: {0}")]
    InvalidMaxFrameSize(usize),

    /// The server answered the upgrade request with something other than
    /// `101 Switching Protocols`.
    #[error("invalid response status: {}", .0.status)]
    InvalidResponseStatus(Box<http::response::Parts>),

    /// The server switched protocols, but the response does not describe a
    /// valid WebSocket upgrade.
    #[error("invalid upgrade response: {0}")]
    InvalidUpgrade(&'static str),

    /// Error occured with the underlying transport.
    #[error("transport: {0}")]
    Transport(#[source] BoxError),

    /// Error occured setting up or negotiating TLS.
    #[error("tls: {0}")]
    Tls(#[source] TlsError),

    /// Error occured during the HTTP exchange.
    #[error("http: {0}")]
    Http(#[source] hyper::Error),

    /// The connection pipeline could not be settled after the upgrade.
    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    /// The attempt was cancelled before it completed, usually because the
    /// engine driving it was shut down.
    #[error("connection attempt canceled")]
    Canceled,
}

impl From<TlsError> for Error {
    fn from(error: TlsError) -> Self {
        Error::Tls(error)
    }
}
