//! Fallback mirrors addressed by episode ordinal (megaplay, vidwish).

use super::{decrypt_sources, with_query, Strategy};
use crate::decrypt::Derivation;
use crate::error::ResolveError;
use crate::keys::{KeyProvider, KeySource};
use crate::normalize::normalize;
use crate::payload::{RawSourcePayload, Sources};
use crate::transport::{Transport, XHR_HEADER};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use shared::models::{EpisodeRef, ServerRef, StreamDescriptor};
use tracing::debug;

static DATA_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-id=["'](\d+)["']"#).expect("valid regex"));

pub struct MirrorStrategy {
    name: String,
    transport: Transport,
    keys: KeyProvider,
    base_url: String,
    /// Registry entry for mirrors that encrypt their sources
    key_source: Option<KeySource>,
}

impl MirrorStrategy {
    pub fn new(
        name: impl Into<String>,
        transport: Transport,
        keys: KeyProvider,
        base_url: impl Into<String>,
        key_source: Option<KeySource>,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            keys,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_source,
        }
    }
}

#[async_trait]
impl Strategy for MirrorStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        server: &ServerRef,
        episode: &EpisodeRef,
    ) -> Result<StreamDescriptor, ResolveError> {
        let page_url = format!(
            "{}/stream/s-2/{}/{}",
            self.base_url,
            episode.episode(),
            server.kind
        );
        let referer = format!("{}/", self.base_url);
        let page = self
            .transport
            .get_with_headers(&page_url, &[("Referer", referer.as_str())])
            .await?;

        let data_id = DATA_ID
            .captures(&page.body)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| ResolveError::extraction(&self.name, "no data-id on stream page"))?;
        debug!(mirror = %self.name, data_id = %data_id, "Found mirror id");

        let sources_url = with_query(
            &format!("{}/stream/getSources", self.base_url),
            &[("id", data_id.as_str())],
        )?;
        let payload: RawSourcePayload = self
            .transport
            .get_json(&sources_url, &[XHR_HEADER, ("Referer", page_url.as_str())])
            .await?;

        let sources = match (&payload.sources, &self.key_source) {
            (Sources::Plain(items), _) => items.clone(),
            (Sources::Encrypted(ciphertext), Some(source)) => {
                let key = self.keys.fetch(source).await?;
                decrypt_sources(ciphertext, &[&key], Derivation::EvpMd5, &sources_url)?
            }
            (Sources::Encrypted(_), None) => {
                return Err(ResolveError::extraction(
                    &self.name,
                    "sources are encrypted but no key is configured",
                ));
            }
        };

        normalize(&sources, &payload, episode, server, Some(&page_url))
    }
}
