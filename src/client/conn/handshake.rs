//! Driving one connection attempt from connect to hand-off.
//!
//! An attempt moves through a fixed sequence of phases:
//!
//! ```text
//! Initiating -> (TlsNegotiating) -> HttpRequestPending -> UpgradeNegotiating -> Upgraded
//! ```
//!
//! Plain connections skip `TlsNegotiating`. Failure at any point moves the
//! attempt to `Failed`, and the error is the attempt's only result.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::response::Parts;
use http::Request;
use http_body_util::Empty;
use hyper::client::conn::http1;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::io::AsyncWriteExt as _;
use tracing::Instrument as _;

use super::negotiator::{HandshakeKey, UpgradeNegotiator};
use super::pipeline::{Pipeline, Stage, StageKind};
use super::tls::{handler_for_host, Encryption, TlsError, TlsHandler};
use super::transport::{self, Address, BoxIo, Transport};
use super::upgrade::{finalize, WebSocket};
use crate::client::{Scheme, Target};
use crate::config::Configuration;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initiating,
    TlsNegotiating,
    HttpRequestPending,
    UpgradeNegotiating,
    Upgraded,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initiating => "initiating",
            Phase::TlsNegotiating => "tls-negotiating",
            Phase::HttpRequestPending => "http-request-pending",
            Phase::UpgradeNegotiating => "upgrade-negotiating",
            Phase::Upgraded => "upgraded",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One connection attempt.
pub(crate) struct Handshake<T> {
    configuration: Arc<Configuration>,
    transport: T,
    encryption: Arc<dyn Encryption>,
    target: Target,
    scheme: Scheme,
    negotiator: UpgradeNegotiator,
    request: Request<Empty<Bytes>>,
    phase: Phase,
}

impl<T> fmt::Debug for Handshake<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("target", &self.target)
            .field("scheme", &self.scheme)
            .field("phase", &self.phase)
            .finish()
    }
}

impl<T> Handshake<T>
where
    T: Transport,
{
    /// Prepare an attempt. Fails without touching the network when the
    /// configuration, the scheme or the request target is invalid.
    pub(crate) fn new(
        configuration: Arc<Configuration>,
        transport: T,
        encryption: Arc<dyn Encryption>,
        target: Target,
    ) -> Result<Self, Error> {
        configuration.validate()?;
        let scheme: Scheme = target.scheme().parse()?;
        let negotiator =
            UpgradeNegotiator::new(HandshakeKey::generate(), configuration.max_frame_size());
        let request = negotiator.request(
            target.origin_form()?,
            &target.authority(scheme),
            target.headers(),
            Empty::<Bytes>::new(),
        )?;

        Ok(Self {
            configuration,
            transport,
            encryption,
            target,
            scheme,
            negotiator,
            request,
            phase: Phase::Initiating,
        })
    }

    /// Run the attempt, handing the connection to `on_upgrade` on success.
    ///
    /// `on_upgrade` is called before this future resolves, and never when it
    /// resolves to an error.
    pub(crate) async fn run<F>(mut self, on_upgrade: F) -> Result<(), Error>
    where
        F: FnOnce(WebSocket) + Send + 'static,
    {
        let span = tracing::debug_span!(
            "websocket",
            scheme = %self.scheme,
            host = %self.target.host(),
            port = self.target.port()
        );

        async move {
            match self.establish().await {
                Ok(websocket) => {
                    self.transition(Phase::Upgraded);
                    on_upgrade(websocket);
                    Ok(())
                }
                Err(error) => {
                    self.transition(Phase::Failed);
                    tracing::debug!(%error, "websocket upgrade failed");
                    Err(error)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, phase: Phase) {
        tracing::trace!(from = %self.phase, to = %phase, "handshake phase");
        self.phase = phase;
    }

    async fn establish(&mut self) -> Result<WebSocket, Error> {
        let address = Address::new(self.target.host(), self.target.port());
        let io = transport::connect(self.transport.clone(), address)
            .await
            .map_err(Error::Transport)?;
        let mut io: BoxIo = Box::new(io);
        tracing::trace!("transport connected");

        let mut pipeline = Pipeline::new();

        let handler = if self.scheme.is_encrypted() {
            match self.tls_handler() {
                Ok((handler, server_name)) => {
                    pipeline.add_last(Stage::Tls { server_name })?;
                    Some(handler)
                }
                Err(error) => {
                    tracing::debug!(%error, "closing transport after tls setup failure");
                    close(io, &mut pipeline).await;
                    return Err(error.into());
                }
            }
        } else {
            None
        };

        let request = std::mem::take(&mut self.request);
        pipeline.add_last(Stage::HttpClient {
            forward_leftover_bytes: true,
        })?;
        pipeline.add_last(Stage::HttpRequest {
            uri: request.uri().clone(),
            headers: self.target.headers().clone(),
        })?;

        if let Some(handler) = handler {
            self.transition(Phase::TlsNegotiating);
            io = handler.handshake(io).await?;
        }

        self.transition(Phase::HttpRequestPending);
        let (upgraded, response) = self.exchange(io, request).await?;

        let max_frame_size = self.negotiator.max_frame_size();
        pipeline.replace(StageKind::HttpClient, Stage::Framing { max_frame_size })?;
        finalize(&mut pipeline, self.configuration.decompression())?;

        Ok(WebSocket::new(
            upgraded,
            pipeline,
            max_frame_size,
            self.configuration.decompression().limit(),
            response,
        ))
    }

    fn tls_handler(&self) -> Result<(Box<dyn TlsHandler>, Option<String>), TlsError> {
        let context = self.encryption.context(self.configuration.tls())?;
        handler_for_host(self.encryption.as_ref(), &context, self.target.host())
    }

    async fn exchange(
        &mut self,
        io: BoxIo,
        request: Request<Empty<Bytes>>,
    ) -> Result<(Upgraded, Parts), Error> {
        let builder = http1::Builder::new();
        let (mut sender, conn) = builder
            .handshake::<_, Empty<Bytes>>(TokioIo::new(io))
            .await
            .map_err(Error::Http)?;

        let driver = tokio::spawn(async move {
            if let Err(error) = conn.with_upgrades().await {
                tracing::debug!(%error, "http/1 connection driver error");
            }
        });

        let result = async {
            let mut response = sender.send_request(request).await.map_err(Error::Http)?;
            self.transition(Phase::UpgradeNegotiating);

            let upgrade = hyper::upgrade::on(&mut response);
            let (parts, _) = response.into_parts();
            let parts = self.negotiator.confirm(parts)?;
            let upgraded = upgrade.await.map_err(Error::Http)?;
            Ok((upgraded, parts))
        }
        .await;

        if result.is_err() {
            driver.abort();
        }
        result
    }
}

/// Shut the transport down and close the pipeline of a failed attempt.
async fn close(mut io: BoxIo, pipeline: &mut Pipeline) {
    if let Err(error) = io.shutdown().await {
        tracing::trace!(%error, "transport shutdown");
    }
    drop(io);
    pipeline.close();
}
