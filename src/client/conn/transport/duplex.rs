//! In-memory duplex transport.

use std::future::{ready, Ready};
use std::io;
use std::task::{Context, Poll};

use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use super::Address;

/// Create a connected transport and acceptor pair.
///
/// Every connection made through the transport yields the server half of a
/// fresh [`tokio::io::duplex`] pair from the acceptor.
pub fn pair(max_buf_size: usize) -> (DuplexTransport, DuplexIncoming) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        DuplexTransport {
            max_buf_size,
            sender,
        },
        DuplexIncoming { receiver },
    )
}

/// Transport via duplex stream
#[derive(Debug, Clone)]
pub struct DuplexTransport {
    max_buf_size: usize,
    sender: mpsc::UnboundedSender<(Address, DuplexStream)>,
}

impl tower::Service<Address> for DuplexTransport {
    type Response = DuplexStream;
    type Error = io::Error;
    type Future = Ready<Result<DuplexStream, io::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, address: Address) -> Self::Future {
        let (client, server) = tokio::io::duplex(self.max_buf_size);
        tracing::trace!(%address, "duplex connect");

        match self.sender.send((address, server)) {
            Ok(()) => ready(Ok(client)),
            Err(_) => ready(Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "duplex acceptor closed",
            ))),
        }
    }
}

/// The accepting side of a [`DuplexTransport`].
#[derive(Debug)]
pub struct DuplexIncoming {
    receiver: mpsc::UnboundedReceiver<(Address, DuplexStream)>,
}

impl DuplexIncoming {
    /// Wait for the next connection, returning the address the client asked
    /// for and the server half of the stream.
    pub async fn accept(&mut self) -> Option<(Address, DuplexStream)> {
        self.receiver.recv().await
    }
}
