//! wsdriver
//!
//! Client-side connection establishment for WebSockets over hyper.
//!
//! A [`Client`] connects a transport, optionally negotiates TLS, performs the
//! HTTP/1.1 upgrade handshake and hands the upgraded connection to caller code
//! as a [`WebSocket`]. The framing protocol itself is not implemented here: the
//! handed-off object is a byte stream positioned right after the upgrade response.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! use wsdriver::{Client, Target};
//!
//! let client = Client::builder().build()?;
//!
//! let signal = client.connect(Target::new("wss", "example.com", 443), |ws| {
//!     println!("upgraded: {:?}", ws.pipeline());
//! });
//! signal.await?;
//!
//! client.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod client;
pub mod config;
pub mod engine;
pub mod error;

pub use client::conn::pipeline::{Pipeline, Stage, StageKind};
pub use client::conn::upgrade::WebSocket;
pub use client::{Client, CompletionSignal, Scheme, Target};
pub use config::{Configuration, Decompression, DecompressionLimit};
pub use engine::{AlreadyShutdown, Engine, EngineProvider};
pub use error::Error;

/// Boxed error type used for transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

