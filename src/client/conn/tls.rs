//! TLS for `wss` connections.
//!
//! Encryption is set up in two steps. An [`Encryption`] first builds a
//! context, the rustls client configuration shared by the attempt, from the
//! configured settings or a default profile. It then builds a per-connection
//! [`TlsHandler`] bound to the name used for certificate validation.
//!
//! Some TLS stacks refuse IP addresses as server names. When the target host is
//! an IP literal and the handler reports [`TlsError::IpAddressServerName`], the
//! handler is rebuilt once without a server name.

use std::fmt;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use thiserror::Error;
use tokio_rustls::TlsConnector;

use super::transport::{BoxIo, Io as _};

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

/// Error setting up or negotiating TLS.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TlsError {
    /// The TLS stack does not accept an IP address as a server name.
    #[error("ip address {0} cannot be used as a server name")]
    IpAddressServerName(String),

    /// The host is not a valid server name.
    #[error("invalid server name: {0:?}")]
    InvalidServerName(String),

    /// No server name was given, and the stream has no peer address to
    /// validate against.
    #[error("no server name to validate the peer against")]
    MissingServerName,

    /// The platform provided no usable root certificates.
    #[error("no root certificates available")]
    NoRootCertificates,

    /// The TLS configuration was rejected.
    #[error("tls configuration: {0}")]
    Context(#[source] rustls::Error),

    /// The TLS handshake failed.
    #[error("tls handshake: {0}")]
    Handshake(#[source] io::Error),
}

/// Performs the TLS handshake for one connection.
pub trait TlsHandler: fmt::Debug + Send {
    /// Run the handshake over `io`, returning the encrypted stream.
    fn handshake(self: Box<Self>, io: BoxIo) -> BoxFuture<'static, Result<BoxIo, TlsError>>;
}

/// Builds TLS contexts and handlers.
pub trait Encryption: fmt::Debug + Send + Sync + 'static {
    /// Build the context for an attempt. `settings` is the configured TLS
    /// configuration; when absent a default secure profile is used.
    fn context(&self, settings: Option<&Arc<ClientConfig>>) -> Result<Arc<ClientConfig>, TlsError>;

    /// Build a handler which validates the peer against `server_name`.
    fn handler(
        &self,
        context: &Arc<ClientConfig>,
        server_name: Option<&str>,
    ) -> Result<Box<dyn TlsHandler>, TlsError>;
}

/// Build the handler for `host`, retrying without a server name when `host`
/// is an IP literal the TLS stack refuses.
///
/// Returns the handler and the server name it validates against.
pub(crate) fn handler_for_host(
    encryption: &dyn Encryption,
    context: &Arc<ClientConfig>,
    host: &str,
) -> Result<(Box<dyn TlsHandler>, Option<String>), TlsError> {
    match encryption.handler(context, Some(host)) {
        Ok(handler) => Ok((handler, Some(host.to_owned()))),
        Err(TlsError::IpAddressServerName(_)) if host.parse::<IpAddr>().is_ok() => {
            tracing::debug!(%host, "ip address refused as server name, retrying without one");
            encryption.handler(context, None).map(|handler| (handler, None))
        }
        Err(error) => Err(error),
    }
}

/// Default client configuration, trusting the platform root certificates and
/// offering only HTTP/1.1, which the upgrade requires.
pub fn default_tls_config() -> Result<ClientConfig, TlsError> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::warn!(%error, "could not load platform certificate");
    }

    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    tracing::trace!(added, ignored, "loaded platform certificates");
    if roots.is_empty() {
        return Err(TlsError::NoRootCertificates);
    }

    let mut cfg = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    cfg.alpn_protocols.push(b"http/1.1".to_vec());
    Ok(cfg)
}

/// Encryption backed by rustls.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustlsEncryption;

impl Encryption for RustlsEncryption {
    fn context(&self, settings: Option<&Arc<ClientConfig>>) -> Result<Arc<ClientConfig>, TlsError> {
        match settings {
            Some(config) => Ok(config.clone()),
            None => {
                tracing::trace!("building default tls profile");
                default_tls_config().map(Arc::new)
            }
        }
    }

    fn handler(
        &self,
        context: &Arc<ClientConfig>,
        server_name: Option<&str>,
    ) -> Result<Box<dyn TlsHandler>, TlsError> {
        let server_name = server_name
            .map(|name| {
                ServerName::try_from(name.to_owned())
                    .map_err(|_| TlsError::InvalidServerName(name.to_owned()))
            })
            .transpose()?;

        Ok(Box::new(RustlsHandler {
            connector: TlsConnector::from(context.clone()),
            server_name,
        }))
    }
}

/// Handler which runs a rustls client handshake.
///
/// Without a server name, the peer is validated against its IP address.
struct RustlsHandler {
    connector: TlsConnector,
    server_name: Option<ServerName<'static>>,
}

impl fmt::Debug for RustlsHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RustlsHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl TlsHandler for RustlsHandler {
    fn handshake(self: Box<Self>, io: BoxIo) -> BoxFuture<'static, Result<BoxIo, TlsError>> {
        Box::pin(async move {
            let server_name = match self.server_name {
                Some(name) => name,
                None => {
                    let addr = io.peer_addr().ok_or(TlsError::MissingServerName)?;
                    ServerName::IpAddress(addr.ip().into())
                }
            };

            tracing::trace!(?server_name, "tls handshake");
            let stream = self
                .connector
                .connect(server_name, io)
                .await
                .map_err(TlsError::Handshake)?;

            let io: BoxIo = Box::new(stream);
            Ok(io)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use static_assertions::assert_impl_all;

    use mock::MockEncryption;

    assert_impl_all!(TlsError: std::error::Error, Send, Sync);
    assert_impl_all!(RustlsEncryption: Encryption);

    fn context() -> Arc<ClientConfig> {
        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(rustls::RootCertStore::empty())
                .with_no_client_auth(),
        )
    }

    #[test]
    fn rustls_context_prefers_settings() {
        let settings = context();
        let built = RustlsEncryption.context(Some(&settings)).unwrap();
        assert!(Arc::ptr_eq(&settings, &built));
    }

    #[test]
    fn rustls_handler_accepts_names_and_ips() {
        let context = context();
        assert!(RustlsEncryption.handler(&context, Some("example.com")).is_ok());
        assert!(RustlsEncryption.handler(&context, Some("10.0.0.1")).is_ok());
        assert!(RustlsEncryption.handler(&context, None).is_ok());
        assert!(matches!(
            RustlsEncryption.handler(&context, Some("not a name")),
            Err(TlsError::InvalidServerName(_))
        ));
    }

    #[test]
    fn ip_fallback_drops_server_name() {
        let encryption = MockEncryption::new().rejecting_ip_server_names();
        let context = context();

        let (_, name) = handler_for_host(&encryption, &context, "10.0.0.1").unwrap();
        assert_eq!(name, None);
        assert_eq!(
            encryption.server_names(),
            vec![Some("10.0.0.1".to_owned()), None]
        );
    }

    #[test]
    fn names_are_not_retried() {
        let encryption = MockEncryption::new().rejecting_ip_server_names();
        let context = context();

        let (_, name) = handler_for_host(&encryption, &context, "example.com").unwrap();
        assert_eq!(name.as_deref(), Some("example.com"));
        assert_eq!(encryption.server_names(), vec![Some("example.com".to_owned())]);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let encryption = MockEncryption::new().rejecting_server_names();
        let context = context();

        let error = handler_for_host(&encryption, &context, "10.0.0.1").unwrap_err();
        assert!(matches!(error, TlsError::InvalidServerName(_)));
        assert_eq!(encryption.server_names().len(), 1);
    }

    #[tokio::test]
    async fn rustls_without_name_needs_peer_address() {
        let (client, _server) = tokio::io::duplex(64);
        let handler = RustlsEncryption.handler(&context(), None).unwrap();

        let result = handler.handshake(Box::new(client)).await;
        assert!(matches!(result, Err(TlsError::MissingServerName)));
    }
}
