//! Stream extraction strategies.
//!
//! Each strategy resolves a server against one embed host's API. The
//! [`Resolver`](crate::resolver::Resolver) tries them in a fixed order.

mod megacloud;
mod mirror;
mod primary;

pub use megacloud::MegacloudStrategy;
pub use mirror::MirrorStrategy;
pub use primary::PrimaryStrategy;

use crate::decrypt::{self, Derivation};
use crate::error::ResolveError;
use crate::keys::DecryptionKey;
use crate::payload::{self, SourceItem};
use crate::transport::{Transport, XHR_HEADER};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use shared::models::{EpisodeRef, ServerRef, StreamDescriptor};
use tracing::debug;

static SOURCE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/([^/?]+)\?").expect("valid regex"));
static EMBED_BASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://[^/]+(?:/[^/]+){3})").expect("valid regex"));

/// One way of turning a server into a playable stream
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    async fn resolve(
        &self,
        server: &ServerRef,
        episode: &EpisodeRef,
    ) -> Result<StreamDescriptor, ResolveError>;
}

#[derive(Debug, Deserialize)]
struct EmbedLinkResponse {
    #[serde(default)]
    link: String,
}

/// Ask the main site which embed page serves `server_id`
pub(crate) async fn fetch_embed_link(
    transport: &Transport,
    site_base: &str,
    server_id: &str,
) -> Result<String, ResolveError> {
    let url = with_query(
        &format!("{site_base}/ajax/v2/episode/sources"),
        &[("id", server_id)],
    )?;
    let response: EmbedLinkResponse = transport.get_json(&url, &[XHR_HEADER]).await?;

    if response.link.is_empty() {
        return Err(ResolveError::extraction("embed link", "missing link in sources response"));
    }

    debug!(server_id = %server_id, link = %response.link, "Fetched embed link");
    Ok(response.link)
}

/// Append percent-encoded query parameters to `base`
pub(crate) fn with_query(base: &str, params: &[(&str, &str)]) -> Result<String, ResolveError> {
    reqwest::Url::parse_with_params(base, params)
        .map(|url| url.to_string())
        .map_err(|e| ResolveError::extraction("request URL", format!("{base}: {e}")))
}

/// Embed page URL split into the host API base and the source id
///
/// `https://host/embed-2/v3/e-1/AbC123?k=1` has base
/// `https://host/embed-2/v3/e-1` and source id `AbC123`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmbedUrl {
    pub base: String,
    pub source_id: String,
}

impl EmbedUrl {
    pub fn parse(link: &str) -> Result<Self, ResolveError> {
        let source_id = SOURCE_ID
            .captures(link)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ResolveError::extraction("embed link", format!("no source id in {link}")))?;
        let base = EMBED_BASE
            .captures(link)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ResolveError::extraction("embed link", format!("no base URL in {link}")))?;

        Ok(Self { base, source_id })
    }
}

/// Decrypt a source list, trying each key in order
pub(crate) fn decrypt_sources(
    ciphertext: &str,
    keys: &[&DecryptionKey],
    derivation: Derivation,
    url: &str,
) -> Result<Vec<SourceItem>, ResolveError> {
    let mut last = ResolveError::NoSourcesFound;

    for key in keys {
        match decrypt::decrypt(ciphertext, key.as_str(), derivation) {
            Ok(plaintext) => match payload::parse_source_list(&plaintext) {
                Ok(items) => return Ok(items),
                Err(e) => {
                    last = ResolveError::UpstreamFormat {
                        url: url.to_string(),
                        reason: format!("decrypted sources are not a source list: {e}"),
                    }
                }
            },
            Err(e) => last = ResolveError::DecryptFailed(e),
        }
    }

    Err(last)
}
