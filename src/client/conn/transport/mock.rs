//! A transport which fails every connection, suitable for testing failure
//! propagation of transport-dependent code.

use std::future::{ready, Ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::DuplexStream;

use super::Address;

/// An error returned by every [`MockTransport`] connection attempt.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("connection error")]
pub struct MockConnectionError;

/// A mock transport which refuses every connection.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    attempts: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Transport which immediately returns an error.
    pub fn connection_error() -> Self {
        Self::default()
    }

    /// How many connections have been attempted.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl tower::Service<Address> for MockTransport {
    type Response = DuplexStream;

    type Error = MockConnectionError;

    type Future = Ready<Result<DuplexStream, MockConnectionError>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, address: Address) -> Self::Future {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(%address, "mock transport refusing connection");
        ready(Err(MockConnectionError))
    }
}
