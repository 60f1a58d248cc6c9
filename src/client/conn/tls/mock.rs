//! Encryption which records what it was asked to build and performs no
//! handshake, suitable for testing TLS-dependent code without certificates.

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustls::ClientConfig;

use super::{Encryption, TlsError, TlsHandler};
use crate::client::conn::transport::BoxIo;

#[derive(Debug, Default)]
struct Calls {
    default_contexts: usize,
    configured_contexts: usize,
    server_names: Vec<Option<String>>,
    handshakes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum NameMode {
    #[default]
    Accept,
    RejectIp,
    RejectAll,
}

/// A mock [`Encryption`] whose handlers pass bytes through unchanged.
#[derive(Debug, Clone, Default)]
pub struct MockEncryption {
    calls: Arc<Mutex<Calls>>,
    names: NameMode,
    fail_context: bool,
    fail_handshake: bool,
}

impl MockEncryption {
    /// Encryption which accepts every server name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse IP addresses as server names, as some TLS stacks do.
    pub fn rejecting_ip_server_names(mut self) -> Self {
        self.names = NameMode::RejectIp;
        self
    }

    /// Refuse every server name.
    pub fn rejecting_server_names(mut self) -> Self {
        self.names = NameMode::RejectAll;
        self
    }

    /// Fail to build any context.
    pub fn failing_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    /// Fail every handshake with a reset connection.
    pub fn failing_handshake(mut self) -> Self {
        self.fail_handshake = true;
        self
    }

    /// How many contexts were built from the default profile.
    pub fn default_contexts(&self) -> usize {
        self.calls.lock().default_contexts
    }

    /// How many contexts were built from configured settings.
    pub fn configured_contexts(&self) -> usize {
        self.calls.lock().configured_contexts
    }

    /// Server names handlers were requested for, in order.
    pub fn server_names(&self) -> Vec<Option<String>> {
        self.calls.lock().server_names.clone()
    }

    /// How many handshakes were performed.
    pub fn handshakes(&self) -> usize {
        self.calls.lock().handshakes
    }
}

impl Encryption for MockEncryption {
    fn context(&self, settings: Option<&Arc<ClientConfig>>) -> Result<Arc<ClientConfig>, TlsError> {
        if self.fail_context {
            return Err(TlsError::NoRootCertificates);
        }

        let mut calls = self.calls.lock();
        match settings {
            Some(config) => {
                calls.configured_contexts += 1;
                Ok(config.clone())
            }
            None => {
                calls.default_contexts += 1;
                Ok(Arc::new(
                    ClientConfig::builder()
                        .with_root_certificates(rustls::RootCertStore::empty())
                        .with_no_client_auth(),
                ))
            }
        }
    }

    fn handler(
        &self,
        _context: &Arc<ClientConfig>,
        server_name: Option<&str>,
    ) -> Result<Box<dyn TlsHandler>, TlsError> {
        self.calls
            .lock()
            .server_names
            .push(server_name.map(String::from));

        match (self.names, server_name) {
            (NameMode::RejectIp, Some(name)) if name.parse::<std::net::IpAddr>().is_ok() => {
                Err(TlsError::IpAddressServerName(name.to_owned()))
            }
            (NameMode::RejectAll, Some(name)) => Err(TlsError::InvalidServerName(name.to_owned())),
            _ => Ok(Box::new(PassthroughHandler {
                calls: self.calls.clone(),
                fail: self.fail_handshake,
            })),
        }
    }
}

#[derive(Debug)]
struct PassthroughHandler {
    calls: Arc<Mutex<Calls>>,
    fail: bool,
}

impl TlsHandler for PassthroughHandler {
    fn handshake(self: Box<Self>, io: BoxIo) -> BoxFuture<'static, Result<BoxIo, TlsError>> {
        self.calls.lock().handshakes += 1;
        let result = if self.fail {
            Err(TlsError::Handshake(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock handshake failure",
            )))
        } else {
            Ok(io)
        };
        Box::pin(std::future::ready(result))
    }
}
