//! Megacloud v3 sources API keyed by the embed page's client key.

use super::{decrypt_sources, fetch_embed_link, with_query, EmbedUrl, Strategy};
use crate::decrypt::Derivation;
use crate::error::ResolveError;
use crate::keys::{DecryptionKey, KeyProvider, KeySource};
use crate::normalize::normalize;
use crate::payload::{RawSourcePayload, Sources};
use crate::token::TokenExtractor;
use crate::transport::{Transport, XHR_HEADER};
use async_trait::async_trait;
use shared::models::{EpisodeRef, ServerRef, StreamDescriptor};
use tracing::debug;

pub struct MegacloudStrategy {
    transport: Transport,
    tokens: TokenExtractor,
    keys: KeyProvider,
    site_base: String,
    api_base: String,
    registry: KeySource,
}

impl MegacloudStrategy {
    pub fn new(
        transport: Transport,
        tokens: TokenExtractor,
        keys: KeyProvider,
        site_base: impl Into<String>,
        api_base: impl Into<String>,
        registry: KeySource,
    ) -> Self {
        Self {
            transport,
            tokens,
            keys,
            site_base: site_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            registry,
        }
    }
}

#[async_trait]
impl Strategy for MegacloudStrategy {
    fn name(&self) -> &str {
        "megacloud"
    }

    async fn resolve(
        &self,
        server: &ServerRef,
        episode: &EpisodeRef,
    ) -> Result<StreamDescriptor, ResolveError> {
        let link = fetch_embed_link(&self.transport, &self.site_base, &server.id).await?;
        let embed = EmbedUrl::parse(&link)?;

        let client_key = DecryptionKey::new(self.tokens.extract(&link).await?);

        let sources_url = with_query(
            &format!("{}/embed-2/v3/e-1/getSources", self.api_base),
            &[("id", embed.source_id.as_str()), ("_k", client_key.as_str())],
        )?;
        let payload: RawSourcePayload = self
            .transport
            .get_json(
                &sources_url,
                &[("Accept", "*/*"), XHR_HEADER, ("Referer", link.as_str())],
            )
            .await?;

        let sources = match &payload.sources {
            Sources::Plain(items) => items.clone(),
            Sources::Encrypted(ciphertext) => {
                let registry_key = self.keys.fetch(&self.registry).await?;
                debug!("Decrypting megacloud sources");
                decrypt_sources(
                    ciphertext,
                    &[&client_key, &registry_key],
                    Derivation::EvpMd5,
                    &sources_url,
                )?
            }
        };

        normalize(&sources, &payload, episode, server, Some(&link))
    }
}
