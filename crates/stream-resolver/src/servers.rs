//! Episode server listing.

use crate::error::ResolveError;
use crate::transport::{Transport, XHR_HEADER};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use shared::models::{EpisodeRef, ServerKind, ServerRef, ServersResponse};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

static SUB_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".ps_-block .ps__-list .server-item[data-type='sub']").expect("valid selector")
});
static DUB_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".ps_-block .ps__-list .server-item[data-type='dub']").expect("valid selector")
});

/// AJAX envelope; `status` is either `"success"` or a boolean
#[derive(Debug, Deserialize)]
struct ServersEnvelope {
    status: EnvelopeStatus,
    #[serde(default)]
    html: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvelopeStatus {
    Flag(bool),
    Text(String),
}

impl EnvelopeStatus {
    fn is_ok(&self) -> bool {
        match self {
            EnvelopeStatus::Flag(ok) => *ok,
            EnvelopeStatus::Text(text) => text == "success",
        }
    }
}

/// Lists the sub/dub servers of an episode
#[derive(Debug, Clone)]
pub struct ServerLister {
    transport: Transport,
    base_url: String,
    rate_limit: Duration,
}

impl ServerLister {
    pub fn new(transport: Transport, base_url: impl Into<String>, rate_limit: Duration) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limit,
        }
    }

    pub async fn list(&self, episode: &EpisodeRef) -> Result<ServersResponse, ResolveError> {
        if !self.rate_limit.is_zero() {
            sleep(self.rate_limit).await;
        }

        let url = format!(
            "{}/ajax/v2/episode/servers?episodeId={}",
            self.base_url,
            episode.episode()
        );
        let referer = format!(
            "{}/watch/{}?ep={}",
            self.base_url,
            episode.slug(),
            episode.episode()
        );

        let envelope: ServersEnvelope = self
            .transport
            .get_json(&url, &[("Referer", referer.as_str()), XHR_HEADER])
            .await?;

        if !envelope.status.is_ok() {
            return Err(ResolveError::UpstreamFormat {
                url,
                reason: "server list returned an error status".to_string(),
            });
        }

        let servers = parse_servers(&envelope.html, episode);
        debug!(
            episode = %episode,
            sub = servers.sub.len(),
            dub = servers.dub.len(),
            "Listed servers"
        );
        Ok(servers)
    }
}

/// Extract the server list from the AJAX HTML fragment
pub fn parse_servers(html: &str, episode: &EpisodeRef) -> ServersResponse {
    let fragment = Html::parse_fragment(html);

    let servers_of = |selector: &Selector, kind: ServerKind| -> Vec<ServerRef> {
        fragment
            .select(selector)
            .enumerate()
            .map(|(index, item)| ServerRef {
                id: item.value().attr("data-id").unwrap_or_default().to_string(),
                name: item.text().collect::<String>().trim().to_string(),
                kind,
                index,
            })
            .collect()
    };

    ServersResponse {
        episode: episode.episode().parse().unwrap_or(0),
        sub: servers_of(&SUB_SELECTOR, ServerKind::Sub),
        dub: servers_of(&DUB_SELECTOR, ServerKind::Dub),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::test_transport;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SERVERS_HTML: &str = r#"
        <div class="ps_-block ps_-block-sub servers-sub">
            <div class="ps__-list">
                <div class="item server-item" data-type="sub" data-id="abc123" data-server-id="4">
                    <a href="javascript:;" class="btn"> HD-1 </a>
                </div>
                <div class="item server-item" data-type="sub" data-id="abc456" data-server-id="1">
                    <a href="javascript:;" class="btn">HD-2</a>
                </div>
            </div>
        </div>
        <div class="ps_-block ps_-block-sub servers-dub">
            <div class="ps__-list">
                <div class="item server-item" data-type="dub" data-id="dub789" data-server-id="4">
                    <a href="javascript:;" class="btn">HD-1</a>
                </div>
            </div>
        </div>"#;

    #[test]
    fn test_parse_servers() {
        let episode: EpisodeRef = "one-piece-100::ep=2142".parse().unwrap();
        let servers = parse_servers(SERVERS_HTML, &episode);

        assert_eq!(servers.episode, 2142);
        assert_eq!(servers.sub.len(), 2);
        assert_eq!(servers.dub.len(), 1);
        assert_eq!(
            servers.sub[0],
            ServerRef {
                id: "abc123".to_string(),
                name: "HD-1".to_string(),
                kind: ServerKind::Sub,
                index: 0,
            }
        );
        assert_eq!(servers.sub[1].index, 1);
        assert_eq!(servers.dub[0].kind, ServerKind::Dub);
    }

    #[test]
    fn test_non_numeric_episode() {
        let episode: EpisodeRef = "movie::ep=special".parse().unwrap();
        assert_eq!(parse_servers("", &episode).episode, 0);
    }

    #[tokio::test]
    async fn test_list_servers_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/servers"))
            .and(query_param("episodeId", "2142"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "html": SERVERS_HTML,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let lister = ServerLister::new(test_transport(0), server.uri(), Duration::ZERO);
        let episode: EpisodeRef = "one-piece-100::ep=2142".parse().unwrap();
        let servers = lister.list(&episode).await.unwrap();
        assert_eq!(servers.sub[0].id, "abc123");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax/v2/episode/servers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "error", "html": ""})),
            )
            .mount(&server)
            .await;

        let lister = ServerLister::new(test_transport(0), server.uri(), Duration::ZERO);
        let episode: EpisodeRef = "a::ep=1".parse().unwrap();
        assert!(matches!(
            lister.list(&episode).await,
            Err(ResolveError::UpstreamFormat { .. })
        ));
    }
}
