use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::conn::tls::{Encryption, RustlsEncryption};
use super::conn::transport::tcp::{Bootstrap, TcpConfig};
use super::Client;
use crate::config::Configuration;
use crate::engine::{Engine, EngineProvider};

/// Where the client's transport comes from.
enum TransportSource<T> {
    /// Use this transport.
    Given(T),

    /// Build the transport once the engine exists.
    Provision(fn(&Handle, TcpConfig) -> T),
}

/// A builder for a [`Client`].
pub struct Builder<T = Bootstrap> {
    configuration: Configuration,
    provider: EngineProvider,
    transport: TransportSource<T>,
    tcp: TcpConfig,
    encryption: Arc<dyn Encryption>,
}

impl<T> fmt::Debug for Builder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transport = match self.transport {
            TransportSource::Given(_) => "given",
            TransportSource::Provision(_) => "provisioned",
        };

        f.debug_struct("Builder")
            .field("configuration", &self.configuration)
            .field("provider", &self.provider)
            .field("transport", &transport)
            .field("tcp", &self.tcp)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl Builder<Bootstrap> {
    /// A builder with the default configuration, a dedicated engine, the TCP
    /// transport chosen for this platform, and rustls encryption.
    pub fn new() -> Self {
        Self {
            configuration: Configuration::default(),
            provider: EngineProvider::default(),
            transport: TransportSource::Provision(Bootstrap::provision),
            tcp: TcpConfig::default(),
            encryption: Arc::new(RustlsEncryption),
        }
    }

    /// Use the provided TCP configuration for the provisioned transport.
    pub fn with_tcp_config(mut self, config: TcpConfig) -> Self {
        self.tcp = config;
        self
    }
}

impl Default for Builder<Bootstrap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Builder<T> {
    /// Use this configuration for every attempt.
    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = configuration;
        self
    }

    /// Mutable access to the configuration.
    pub fn configuration(&mut self) -> &mut Configuration {
        &mut self.configuration
    }

    /// Choose where the engine comes from.
    pub fn with_engine(mut self, provider: EngineProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Use a custom transport.
    pub fn with_transport<U>(self, transport: U) -> Builder<U> {
        Builder {
            configuration: self.configuration,
            provider: self.provider,
            transport: TransportSource::Given(transport),
            tcp: self.tcp,
            encryption: self.encryption,
        }
    }

    /// Use a custom encryption provider for `wss` targets.
    pub fn with_encryption<E>(mut self, encryption: E) -> Self
    where
        E: Encryption,
    {
        self.encryption = Arc::new(encryption);
        self
    }

    /// Build the client, creating its engine.
    pub fn build(self) -> io::Result<Client<T>> {
        let engine = Engine::new(self.provider)?;
        let transport = match self.transport {
            TransportSource::Given(transport) => transport,
            TransportSource::Provision(provision) => provision(engine.handle(), self.tcp),
        };

        tracing::trace!(owned = engine.is_owned(), "client built");
        Ok(Client::from_parts(
            self.configuration,
            engine,
            transport,
            self.encryption,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::conn::transport::tcp::TransportKind;
    use crate::config::Decompression;

    #[tokio::test]
    async fn build_with_shared_engine() {
        let client = Builder::new()
            .with_engine(EngineProvider::current().unwrap())
            .with_configuration(Configuration::new().with_decompression(Decompression::enabled()))
            .build()
            .unwrap();

        assert!(!client.engine().is_owned());
        assert_eq!(client.transport().kind(), TransportKind::NativeSocket);
        assert!(client.configuration().decompression().limit().is_some());
    }

    #[test]
    fn build_owned_engine() {
        let mut builder = Builder::new();
        *builder.configuration() = Configuration::new().with_max_frame_size(1024);

        let client = builder.build().unwrap();
        assert!(client.engine().is_owned());
        assert_eq!(client.configuration().max_frame_size(), 1024);
        client.shutdown().unwrap();
    }
}
