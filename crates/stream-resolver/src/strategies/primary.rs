//! Main-site embed host with token-authorized, encrypted sources.

use super::{decrypt_sources, fetch_embed_link, with_query, EmbedUrl, Strategy};
use crate::decrypt::Derivation;
use crate::error::ResolveError;
use crate::keys::{KeyProvider, KeySource};
use crate::normalize::normalize;
use crate::payload::{RawSourcePayload, Sources};
use crate::token::TokenExtractor;
use crate::transport::Transport;
use async_trait::async_trait;
use shared::models::{EpisodeRef, ServerRef, StreamDescriptor};
use tracing::debug;

pub struct PrimaryStrategy {
    transport: Transport,
    tokens: TokenExtractor,
    keys: KeyProvider,
    site_base: String,
    key_source: KeySource,
    derivation: Derivation,
}

impl PrimaryStrategy {
    pub fn new(
        transport: Transport,
        tokens: TokenExtractor,
        keys: KeyProvider,
        site_base: impl Into<String>,
        key_source: KeySource,
        derivation: Derivation,
    ) -> Self {
        Self {
            transport,
            tokens,
            keys,
            site_base: site_base.into().trim_end_matches('/').to_string(),
            key_source,
            derivation,
        }
    }
}

#[async_trait]
impl Strategy for PrimaryStrategy {
    fn name(&self) -> &str {
        "primary"
    }

    async fn resolve(
        &self,
        server: &ServerRef,
        episode: &EpisodeRef,
    ) -> Result<StreamDescriptor, ResolveError> {
        // The key is only needed for encrypted sources, so its failure is
        // not fatal until then.
        let (link, key) = tokio::join!(
            fetch_embed_link(&self.transport, &self.site_base, &server.id),
            self.keys.fetch(&self.key_source),
        );
        let link = link?;
        let embed = EmbedUrl::parse(&link)?;

        let token_url = format!(
            "{}/{}?k=1&autoPlay=0&oa=0&asi=1",
            embed.base, embed.source_id
        );
        let token = self.tokens.extract(&token_url).await?;

        let sources_url = with_query(
            &format!("{}/getSources", embed.base),
            &[("id", embed.source_id.as_str()), ("_k", token.as_str())],
        )?;
        let referer = format!("{}/{}?k=1", embed.base, embed.source_id);
        let payload: RawSourcePayload = self
            .transport
            .get_json(&sources_url, &[("Referer", referer.as_str())])
            .await?;

        let sources = match &payload.sources {
            Sources::Plain(items) => items.clone(),
            Sources::Encrypted(ciphertext) => {
                let key = key?;
                debug!(derivation = %self.derivation, "Decrypting primary sources");
                decrypt_sources(ciphertext, &[&key], self.derivation, &sources_url)?
            }
        };

        normalize(&sources, &payload, episode, server, Some(&link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decrypt::encrypt_salted;
    use crate::transport::tests::test_transport;
    use shared::models::ServerKind;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_ref() -> ServerRef {
        ServerRef {
            id: "abc123".to_string(),
            name: "HD-1".to_string(),
            kind: ServerKind::Sub,
            index: 0,
        }
    }

    fn strategy(mock: &MockServer, derivation: Derivation) -> PrimaryStrategy {
        let transport = test_transport(0);
        PrimaryStrategy::new(
            transport.clone(),
            TokenExtractor::new(transport.clone(), "https://site.test/", Duration::ZERO),
            KeyProvider::new(transport),
            mock.uri(),
            KeySource::PlainText(format!("{}/key.txt", mock.uri())),
            derivation,
        )
    }

    async fn mount_embed(mock: &MockServer, token_page: &str) {
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/sources"))
            .and(query_param("id", "abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "iframe",
                "link": format!("{}/embed-2/v3/e-1/src42?k=1", mock.uri()),
            })))
            .mount(mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/v3/e-1/src42"))
            .respond_with(ResponseTemplate::new(200).set_body_string(token_page.to_string()))
            .mount(mock)
            .await;
    }

    #[tokio::test]
    async fn test_encrypted_sources_are_decrypted() {
        let mock = MockServer::start().await;
        mount_embed(&mock, r#"<html><head><meta name="_gg_fb" content="tok-1"></head></html>"#)
            .await;

        let ciphertext = encrypt_salted(
            r#"[{"file":"https://cdn.example/master.m3u8","type":"hls"}]"#,
            "primary-key",
            [3; 8],
            Derivation::pbkdf2(),
        )
        .unwrap();
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("primary-key\n"))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/v3/e-1/getSources"))
            .and(query_param("id", "src42"))
            .and(query_param("_k", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sources": ciphertext,
                "tracks": [{"file": "https://cdn.example/en.vtt", "kind": "captions"}],
                "intro": {"start": 10, "end": 95},
                "encrypted": true,
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let episode: EpisodeRef = "one-piece-100::ep=2142".parse().unwrap();
        let descriptor = strategy(&mock, Derivation::pbkdf2())
            .resolve(&server_ref(), &episode)
            .await
            .unwrap();

        assert_eq!(descriptor.link.file, "https://cdn.example/master.m3u8");
        assert_eq!(descriptor.tracks.len(), 1);
        assert_eq!(descriptor.intro.map(|r| r.end), Some(95));
        assert_eq!(
            descriptor.iframe,
            Some(format!("{}/embed-2/v3/e-1/src42?k=1", mock.uri()))
        );
    }

    #[tokio::test]
    async fn test_token_is_sent_as_encoded_query_value() {
        let mock = MockServer::start().await;
        mount_embed(
            &mock,
            r#"<meta name="_gg_fb" content="ab+cd&amp;ef=1#x">"#,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("k"))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/v3/e-1/getSources"))
            .and(query_param("id", "src42"))
            .and(query_param("_k", "ab+cd&ef=1#x"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sources": [{"file": "https://cdn.example/escaped.m3u8", "type": "hls"}],
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let episode: EpisodeRef = "one-piece-100::ep=2142".parse().unwrap();
        let descriptor = strategy(&mock, Derivation::pbkdf2())
            .resolve(&server_ref(), &episode)
            .await
            .unwrap();
        assert_eq!(descriptor.link.file, "https://cdn.example/escaped.m3u8");
    }

    #[tokio::test]
    async fn test_plain_sources_do_not_need_a_key() {
        let mock = MockServer::start().await;
        mount_embed(&mock, r#"<div data-dpi="tok-2"></div>"#).await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/v3/e-1/getSources"))
            .and(query_param("_k", "tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sources": [{"file": "https://cdn.example/plain.m3u8", "type": "hls"}],
                "tracks": [],
            })))
            .mount(&mock)
            .await;

        let episode: EpisodeRef = "one-piece-100::ep=2142".parse().unwrap();
        let descriptor = strategy(&mock, Derivation::pbkdf2())
            .resolve(&server_ref(), &episode)
            .await
            .unwrap();
        assert_eq!(descriptor.link.file, "https://cdn.example/plain.m3u8");
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_sources() {
        let mock = MockServer::start().await;
        mount_embed(&mock, "<html><body>no token</body></html>").await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("k"))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/v3/e-1/getSources"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock)
            .await;

        let episode: EpisodeRef = "a::ep=1".parse().unwrap();
        let err = strategy(&mock, Derivation::pbkdf2())
            .resolve(&server_ref(), &episode)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::TokenNotFound { .. }));
    }

    #[tokio::test]
    async fn test_key_failure_surfaces_for_encrypted_sources() {
        let mock = MockServer::start().await;
        mount_embed(&mock, r#"<meta name="_gg_fb" content="tok-3">"#).await;
        Mock::given(method("GET"))
            .and(path("/key.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/embed-2/v3/e-1/getSources"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sources": "U2FsdGVkX1+AAAAAAAAAAA=="})),
            )
            .mount(&mock)
            .await;

        let episode: EpisodeRef = "a::ep=1".parse().unwrap();
        let err = strategy(&mock, Derivation::pbkdf2())
            .resolve(&server_ref(), &episode)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::KeyFetchFailed { .. }));
    }
}
