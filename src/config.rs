//! Negotiation parameters shared by every connection attempt.

use std::sync::Arc;

use rustls::ClientConfig as TlsClientConfig;

use crate::Error;

/// Default maximum accepted frame size, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 14;

/// Default ratio between decompressed and compressed sizes.
pub const DEFAULT_DECOMPRESSION_RATIO: usize = 10;

/// Limit applied by the decompression stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressionLimit {
    /// Decompressed payloads may be at most this many times larger than
    /// their compressed form.
    Ratio(usize),

    /// Decompressed payloads may be at most this many bytes.
    Size(usize),
}

impl DecompressionLimit {
    /// Whether a payload which decompressed from `compressed` to
    /// `decompressed` bytes stays within this limit.
    pub fn permits(&self, compressed: usize, decompressed: usize) -> bool {
        match *self {
            DecompressionLimit::Ratio(ratio) => {
                decompressed <= compressed.saturating_mul(ratio)
            }
            DecompressionLimit::Size(size) => decompressed <= size,
        }
    }
}

impl Default for DecompressionLimit {
    fn default() -> Self {
        DecompressionLimit::Ratio(DEFAULT_DECOMPRESSION_RATIO)
    }
}

/// Whether a decompression stage is installed after the upgrade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Decompression {
    /// No decompression stage.
    #[default]
    Disabled,

    /// Insert a decompression stage enforcing `limit`.
    Enabled {
        /// Limit enforced on every decompressed payload.
        limit: DecompressionLimit,
    },
}

impl Decompression {
    /// Decompression with the default ratio limit.
    pub fn enabled() -> Self {
        Decompression::Enabled {
            limit: DecompressionLimit::default(),
        }
    }

    /// Decompression with an explicit limit.
    pub fn enabled_with(limit: DecompressionLimit) -> Self {
        Decompression::Enabled { limit }
    }

    /// The limit, if decompression is enabled.
    pub fn limit(&self) -> Option<DecompressionLimit> {
        match self {
            Decompression::Disabled => None,
            Decompression::Enabled { limit } => Some(*limit),
        }
    }
}

/// Configuration for WebSocket connection attempts.
///
/// The configuration is immutable once handed to a [`Client`][crate::Client],
/// and is shared by every attempt the client makes.
#[derive(Debug, Clone)]
pub struct Configuration {
    tls: Option<Arc<TlsClientConfig>>,
    max_frame_size: usize,
    decompression: Decompression,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            tls: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            decompression: Decompression::Disabled,
        }
    }
}

impl Configuration {
    /// Create a configuration with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this TLS configuration for `wss` connections.
    ///
    /// When unset, a default profile backed by the platform root certificates
    /// is built for each encrypted attempt.
    pub fn with_tls(mut self, config: impl Into<Arc<TlsClientConfig>>) -> Self {
        self.tls = Some(config.into());
        self
    }

    /// Set the maximum accepted frame size.
    ///
    /// The size must be positive and fit in 32 bits; other values fail every
    /// connection attempt with [`Error::InvalidMaxFrameSize`].
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set the decompression policy.
    pub fn with_decompression(mut self, decompression: Decompression) -> Self {
        self.decompression = decompression;
        self
    }

    /// The TLS configuration, if one was provided.
    pub fn tls(&self) -> Option<&Arc<TlsClientConfig>> {
        self.tls.as_ref()
    }

    /// The maximum accepted frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// The decompression policy.
    pub fn decompression(&self) -> &Decompression {
        &self.decompression
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.max_frame_size == 0 || self.max_frame_size as u64 > u64::from(u32::MAX) {
            return Err(Error::InvalidMaxFrameSize(self.max_frame_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.max_frame_size(), 16384);
        assert_eq!(config.decompression(), &Decompression::Disabled);
        assert!(config.tls().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_uses_default_ratio() {
        assert_eq!(
            Decompression::enabled(),
            Decompression::Enabled {
                limit: DecompressionLimit::Ratio(10)
            }
        );
        assert_eq!(Decompression::Disabled.limit(), None);
    }

    #[test]
    fn max_frame_size_precondition() {
        let config = Configuration::new().with_max_frame_size(0);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidMaxFrameSize(0))
        ));

        let config = Configuration::new().with_max_frame_size(1 << 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn limits() {
        let ratio = DecompressionLimit::Ratio(10);
        assert!(ratio.permits(10, 100));
        assert!(!ratio.permits(10, 101));

        let size = DecompressionLimit::Size(64);
        assert!(size.permits(1, 64));
        assert!(!size.permits(1, 65));
    }
}
