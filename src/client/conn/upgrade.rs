//! Settling the connection once the upgrade is confirmed.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::response::Parts;
use http::HeaderMap;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::pipeline::{Pipeline, PipelineError, Stage, StageKind};
use crate::config::{Decompression, DecompressionLimit};

/// Reshape the pipeline for the upgraded protocol.
///
/// The upgrade request stage is removed; a missing stage is not an error.
/// When decompression is enabled, its stage is inserted after framing.
pub(crate) fn finalize(
    pipeline: &mut Pipeline,
    decompression: &Decompression,
) -> Result<(), PipelineError> {
    if let Err(error) = pipeline.remove(StageKind::HttpRequest) {
        tracing::trace!(%error, "upgrade request stage not removed");
    }

    if let Some(limit) = decompression.limit() {
        pipeline.add_after(StageKind::Framing, Stage::Decompression { limit })?;
    }

    Ok(())
}

/// An upgraded WebSocket connection.
///
/// Reads begin with the first byte the server sent after its upgrade response.
/// Frames are not interpreted: this is the raw upgraded stream together with
/// what was negotiated for it.
pub struct WebSocket {
    io: TokioIo<Upgraded>,
    pipeline: Pipeline,
    max_frame_size: usize,
    decompression: Option<DecompressionLimit>,
    response: Parts,
}

impl WebSocket {
    pub(crate) fn new(
        upgraded: Upgraded,
        pipeline: Pipeline,
        max_frame_size: usize,
        decompression: Option<DecompressionLimit>,
        response: Parts,
    ) -> Self {
        Self {
            io: TokioIo::new(upgraded),
            pipeline,
            max_frame_size,
            decompression,
            response,
        }
    }

    /// The stages attached to this connection.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Maximum accepted frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// The decompression limit, when decompression is enabled.
    pub fn decompression(&self) -> Option<DecompressionLimit> {
        self.decompression
    }

    /// The `101 Switching Protocols` response head.
    pub fn response(&self) -> &Parts {
        &self.response
    }

    /// Headers of the upgrade response.
    pub fn headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// The underlying upgraded stream.
    pub fn into_inner(self) -> Upgraded {
        self.io.into_inner()
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("pipeline", &self.pipeline)
            .field("max_frame_size", &self.max_frame_size)
            .field("decompression", &self.decompression)
            .finish()
    }
}

impl AsyncRead for WebSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for WebSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}
