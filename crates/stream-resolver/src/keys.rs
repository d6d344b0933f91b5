//! Remote decryption key sources.
//!
//! Keys rotate upstream without code changes, so they are fetched fresh for
//! every resolution attempt from externally maintained files.

use crate::error::ResolveError;
use crate::transport::Transport;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Where a decryption key is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Plaintext file whose trimmed body is the key
    PlainText(String),
    /// JSON object holding keys by provider name
    JsonField { url: String, field: String },
}

impl KeySource {
    pub fn url(&self) -> &str {
        match self {
            KeySource::PlainText(url) => url,
            KeySource::JsonField { url, .. } => url,
        }
    }
}

/// Key material fetched from a [`KeySource`]
///
/// `Debug` is redacted so keys never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey(String);

impl DecryptionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecryptionKey(<{} bytes>)", self.0.len())
    }
}

/// Fetches keys through the shared transport
#[derive(Debug, Clone)]
pub struct KeyProvider {
    transport: Transport,
}

impl KeyProvider {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Fetch the current key from `source`
    ///
    /// One transport call; failures are surfaced, never replaced by a
    /// stale or default key.
    pub async fn fetch(&self, source: &KeySource) -> Result<DecryptionKey, ResolveError> {
        let url = source.url();
        let failed = |reason: String| ResolveError::KeyFetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .transport
            .get(url)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let key = match source {
            KeySource::PlainText(_) => response.body.trim().to_string(),
            KeySource::JsonField { field, .. } => {
                extract_field(&response.body, field).map_err(failed)?
            }
        };

        if key.is_empty() {
            return Err(failed("key is empty".to_string()));
        }

        debug!(url = %url, "Fetched decryption key");
        Ok(DecryptionKey(key))
    }
}

fn extract_field(body: &str, field: &str) -> Result<String, String> {
    let document: Value =
        serde_json::from_str(body).map_err(|e| format!("invalid key registry JSON: {e}"))?;

    match document.get(field) {
        Some(Value::String(key)) => Ok(key.trim().to_string()),
        Some(_) => Err(format!("field '{field}' is not a string")),
        None => Err(format!("field '{field}' not present")),
    }
}
