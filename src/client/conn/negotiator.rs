//! The HTTP side of the WebSocket upgrade.
//!
//! An [`UpgradeNegotiator`] is bound to one attempt's key. It builds the
//! upgrade request and decides whether the server's response confirms the
//! upgrade.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Request, StatusCode, Uri};
use rand::RngCore as _;
use sha1::{Digest as _, Sha1};

use crate::Error;

/// Appended to the request key before hashing it into the accept key.
const ACCEPT_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol version sent in `Sec-WebSocket-Version`.
const VERSION: &str = "13";

/// Compute the `Sec-WebSocket-Accept` value a server must answer `key` with.
pub fn accept_key(key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(ACCEPT_GUID);
    STANDARD.encode(sha1.finalize())
}

/// The random key identifying one upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeKey {
    nonce: [u8; 16],
    encoded: String,
}

impl HandshakeKey {
    /// Generate a key from 16 random bytes.
    pub fn generate() -> Self {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::from_nonce(nonce)
    }

    fn from_nonce(nonce: [u8; 16]) -> Self {
        let encoded = STANDARD.encode(nonce);
        Self { nonce, encoded }
    }

    /// The raw nonce.
    pub fn nonce(&self) -> &[u8; 16] {
        &self.nonce
    }

    /// The base64 form sent as `Sec-WebSocket-Key`.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The accept key a server must answer this key with.
    pub fn accept(&self) -> String {
        accept_key(self.encoded.as_bytes())
    }
}

/// Builds the upgrade request for one attempt and validates its response.
#[derive(Debug, Clone)]
pub(crate) struct UpgradeNegotiator {
    key: HandshakeKey,
    max_frame_size: usize,
}

impl UpgradeNegotiator {
    pub(crate) fn new(key: HandshakeKey, max_frame_size: usize) -> Self {
        Self {
            key,
            max_frame_size,
        }
    }

    pub(crate) fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Build the upgrade request. Caller headers follow the upgrade headers.
    pub(crate) fn request<B>(
        &self,
        uri: Uri,
        host: &str,
        headers: &HeaderMap,
        body: B,
    ) -> Result<Request<B>, Error> {
        let mut request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(body)
            .map_err(|error| Error::InvalidUrl(error.to_string()))?;

        let host = HeaderValue::from_str(host)
            .map_err(|_| Error::InvalidUrl(format!("invalid host: {host:?}")))?;
        let key = HeaderValue::from_str(self.key.as_str())
            .map_err(|_| Error::InvalidUrl("invalid handshake key".into()))?;

        let request_headers = request.headers_mut();
        request_headers.insert(header::HOST, host);
        request_headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        request_headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        request_headers.insert(header::SEC_WEBSOCKET_KEY, key);
        request_headers.insert(
            header::SEC_WEBSOCKET_VERSION,
            HeaderValue::from_static(VERSION),
        );

        for (name, value) in headers {
            request_headers.append(name, value.clone());
        }

        Ok(request)
    }

    /// Check that the response head confirms the upgrade.
    pub(crate) fn confirm(
        &self,
        parts: http::response::Parts,
    ) -> Result<http::response::Parts, Error> {
        if parts.status != StatusCode::SWITCHING_PROTOCOLS {
            return Err(Error::InvalidResponseStatus(Box::new(parts)));
        }

        let upgrade = parts
            .headers
            .get(header::UPGRADE)
            .ok_or(Error::InvalidUpgrade("missing upgrade header"))?;
        if !upgrade.as_bytes().eq_ignore_ascii_case(b"websocket") {
            return Err(Error::InvalidUpgrade("upgrade header is not websocket"));
        }

        let connection_upgrade = parts
            .headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
        if !connection_upgrade {
            return Err(Error::InvalidUpgrade("connection header does not upgrade"));
        }

        let accept = parts
            .headers
            .get(header::SEC_WEBSOCKET_ACCEPT)
            .ok_or(Error::InvalidUpgrade("missing accept key"))?;
        if accept.as_bytes() != self.key.accept().as_bytes() {
            return Err(Error::InvalidUpgrade("accept key does not match"));
        }

        Ok(parts)
    }
}
