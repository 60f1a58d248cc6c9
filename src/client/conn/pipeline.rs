//! Per-connection processing stages.
//!
//! A [`Pipeline`] records the ordered stages attached to one connection. It is
//! assembled while the connection is established, reshaped when the upgrade
//! completes, and handed off with the [`WebSocket`][crate::WebSocket] so callers
//! can see which layers sit between them and the socket.
//!
//! Each [`StageKind`] appears at most once.

use std::fmt;

use http::{HeaderMap, Uri};
use thiserror::Error;

use crate::config::DecompressionLimit;

/// Identifies a stage in a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// TLS encryption.
    Tls,
    /// HTTP/1.1 client codec, active until the upgrade.
    HttpClient,
    /// The upgrade request, active until the response arrives.
    HttpRequest,
    /// The upgraded framing protocol.
    Framing,
    /// Message decompression.
    Decompression,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Tls => "tls",
            StageKind::HttpClient => "http-client",
            StageKind::HttpRequest => "http-request",
            StageKind::Framing => "framing",
            StageKind::Decompression => "decompression",
        };
        f.write_str(name)
    }
}

/// A stage and its settings.
#[derive(Debug, Clone)]
pub enum Stage {
    /// TLS, validating the peer against `server_name` when there is one.
    Tls {
        /// The name used for certificate validation.
        server_name: Option<String>,
    },

    /// The HTTP/1.1 client codec.
    HttpClient {
        /// Bytes read past the end of the HTTP response belong to the
        /// upgraded protocol and are forwarded to it.
        forward_leftover_bytes: bool,
    },

    /// The upgrade request.
    HttpRequest {
        /// Request target in origin form.
        uri: Uri,
        /// Headers sent in addition to the upgrade headers.
        headers: HeaderMap,
    },

    /// The upgraded framing protocol.
    Framing {
        /// Maximum accepted frame size.
        max_frame_size: usize,
    },

    /// Message decompression.
    Decompression {
        /// Limit enforced on each decompressed message.
        limit: DecompressionLimit,
    },
}

impl Stage {
    /// The kind of this stage.
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Tls { .. } => StageKind::Tls,
            Stage::HttpClient { .. } => StageKind::HttpClient,
            Stage::HttpRequest { .. } => StageKind::HttpRequest,
            Stage::Framing { .. } => StageKind::Framing,
            Stage::Decompression { .. } => StageKind::Decompression,
        }
    }
}

/// Error returned when a pipeline cannot be changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The stage is already present.
    #[error("stage {0} already present")]
    Duplicate(StageKind),

    /// The stage is not present.
    #[error("stage {0} not found")]
    NotFound(StageKind),

    /// The pipeline belongs to a connection which was closed.
    #[error("pipeline closed")]
    Closed,
}

/// The ordered stages of one connection.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    closed: bool,
}

impl Pipeline {
    /// An empty, open pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage at the end.
    pub fn add_last(&mut self, stage: Stage) -> Result<(), PipelineError> {
        self.check_insert(&stage)?;
        tracing::trace!(stage = %stage.kind(), "stage added");
        self.stages.push(stage);
        Ok(())
    }

    /// Insert a stage directly after `anchor`.
    pub fn add_after(&mut self, anchor: StageKind, stage: Stage) -> Result<(), PipelineError> {
        self.check_insert(&stage)?;
        let index = self.position(anchor)?;
        tracing::trace!(stage = %stage.kind(), after = %anchor, "stage added");
        self.stages.insert(index + 1, stage);
        Ok(())
    }

    /// Remove a stage, returning it.
    pub fn remove(&mut self, kind: StageKind) -> Result<Stage, PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        let index = self.position(kind)?;
        tracing::trace!(stage = %kind, "stage removed");
        Ok(self.stages.remove(index))
    }

    /// Replace the stage `kind` with `stage`, in the same position.
    pub fn replace(&mut self, kind: StageKind, stage: Stage) -> Result<Stage, PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        if stage.kind() != kind && self.contains(stage.kind()) {
            return Err(PipelineError::Duplicate(stage.kind()));
        }
        let index = self.position(kind)?;
        tracing::trace!(stage = %stage.kind(), replaced = %kind, "stage replaced");
        Ok(std::mem::replace(&mut self.stages[index], stage))
    }

    /// Get a stage by kind.
    pub fn get(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.kind() == kind)
    }

    /// Whether a stage of this kind is present.
    pub fn contains(&self, kind: StageKind) -> bool {
        self.get(kind).is_some()
    }

    /// The kinds of all stages, in order.
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// Iterate over the stages in order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there are no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Close the pipeline. Closed pipelines refuse every change.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the pipeline was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_insert(&self, stage: &Stage) -> Result<(), PipelineError> {
        if self.closed {
            return Err(PipelineError::Closed);
        }
        if self.contains(stage.kind()) {
            return Err(PipelineError::Duplicate(stage.kind()));
        }
        Ok(())
    }

    fn position(&self, kind: StageKind) -> Result<usize, PipelineError> {
        self.stages
            .iter()
            .position(|stage| stage.kind() == kind)
            .ok_or(PipelineError::NotFound(kind))
    }
}
