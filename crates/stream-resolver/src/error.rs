//! Error types for stream resolution.

use shared::models::ServerKind;
use thiserror::Error;

/// Failure of a single HTTP exchange after retries.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// A caller-supplied header name or value is not valid HTTP.
    #[error("invalid header '{0}'")]
    InvalidHeader(String),

    /// Network-level failure (connect, timeout, body read).
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Request {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with an unexpected status code.
    #[error("unexpected status code {status} from {url} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },
}

/// Failure to turn an encrypted payload back into plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    #[error("payload is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("decoded payload too short: {0} bytes")]
    TooShort(usize),

    #[error("ciphertext length {0} is not a non-zero multiple of the block size")]
    Misaligned(usize),

    #[error("decrypted data is empty")]
    EmptyPlaintext,

    #[error("invalid padding")]
    InvalidPadding,

    #[error("decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that can occur while resolving a stream.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid episode ID format: '{0}'")]
    InvalidEpisodeFormat(String),

    #[error("server not found: {name} ({kind})")]
    ServerNotFound { name: String, kind: String },

    #[error("no token found on {url}")]
    TokenNotFound { url: String },

    #[error("failed to fetch decryption key from {url}: {reason}")]
    KeyFetchFailed { url: String, reason: String },

    #[error("failed to decrypt sources: {0}")]
    DecryptFailed(#[from] DecryptError),

    #[error("no streaming sources found")]
    NoSourcesFound,

    #[error("all extraction strategies failed, last error ({strategy}): {last}")]
    AllStrategiesExhausted {
        strategy: String,
        #[source]
        last: Box<ResolveError>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A value the strategy needs is missing from an upstream document.
    #[error("{context}: {reason}")]
    Extraction { context: String, reason: String },

    /// An upstream document could not be decoded.
    #[error("unexpected response format from {url}: {reason}")]
    UpstreamFormat { url: String, reason: String },

    #[error("stream resolution timed out after {0} seconds")]
    Timeout(u64),
}

impl ResolveError {
    pub(crate) fn extraction(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn server_not_found(name: &str, kind: ServerKind) -> Self {
        Self::ServerNotFound {
            name: name.to_string(),
            kind: kind.to_string(),
        }
    }

    /// True for caller-input errors that never reach the network.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEpisodeFormat(_) | Self::ServerNotFound { .. }
        )
    }
}
