//! Authorization token extraction from embed pages.
//!
//! Embed pages hide the `_k` token the sources API expects in one of
//! several places. They are probed in a fixed order and the first
//! non-empty candidate wins.

use crate::error::ResolveError;
use crate::transport::Transport;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Shortest value accepted from a `window.*` assignment.
const MIN_WINDOW_TOKEN_LEN: usize = 20;

const NONCE_MARKER: &str = "empty nonce script";

static META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="_gg_fb"]"#).expect("valid selector"));
static DPI_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-dpi]").expect("valid selector"));
static NONCE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script[nonce]").expect("valid selector"));

static WINDOW_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"window\.(\w+)\s*=\s*["']([\w-]+)["']"#).expect("valid regex")
});
static WINDOW_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"window\.(\w+)\s*=\s*(\{[\s\S]*?\});").expect("valid regex"));
static COMMENT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*_is_th:([\w-]+)\s*-->").expect("valid regex"));

/// Where in the page a token was found, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TokenSource {
    MetaTag,
    DataAttribute,
    ScriptNonce,
    WindowString,
    WindowObject,
    Comment,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenSource::MetaTag => "meta",
            TokenSource::DataAttribute => "data-dpi",
            TokenSource::ScriptNonce => "nonce",
            TokenSource::WindowString => "window-string",
            TokenSource::WindowObject => "window-object",
            TokenSource::Comment => "comment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHit {
    pub source: TokenSource,
    pub value: String,
}

impl TokenHit {
    fn new(source: TokenSource, value: &str) -> Option<Self> {
        let value = value.trim();
        (!value.is_empty()).then(|| Self {
            source,
            value: value.to_string(),
        })
    }
}

/// Search an embed page for its token
pub fn find_token(html: &str) -> Option<TokenHit> {
    find_in_markup(html)
        .or_else(|| find_window_string(html))
        .or_else(|| find_window_object(html))
        .or_else(|| {
            COMMENT_TOKEN
                .captures(html)
                .and_then(|caps| TokenHit::new(TokenSource::Comment, &caps[1]))
        })
}

fn find_in_markup(html: &str) -> Option<TokenHit> {
    let document = Html::parse_document(html);

    if let Some(hit) = document
        .select(&META_SELECTOR)
        .find_map(|el| el.value().attr("content"))
        .and_then(|content| TokenHit::new(TokenSource::MetaTag, content))
    {
        return Some(hit);
    }

    if let Some(hit) = document
        .select(&DPI_SELECTOR)
        .find_map(|el| el.value().attr("data-dpi"))
        .and_then(|dpi| TokenHit::new(TokenSource::DataAttribute, dpi))
    {
        return Some(hit);
    }

    document.select(&NONCE_SELECTOR).find_map(|script| {
        let text: String = script.text().collect();
        if !text.contains(NONCE_MARKER) {
            return None;
        }
        script
            .value()
            .attr("nonce")
            .and_then(|nonce| TokenHit::new(TokenSource::ScriptNonce, nonce))
    })
}

fn find_window_string(html: &str) -> Option<TokenHit> {
    WINDOW_STRING
        .captures_iter(html)
        .map(|caps| caps[2].to_string())
        .find(|value| value.len() >= MIN_WINDOW_TOKEN_LEN)
        .and_then(|value| TokenHit::new(TokenSource::WindowString, &value))
}

fn find_window_object(html: &str) -> Option<TokenHit> {
    WINDOW_OBJECT.captures_iter(html).find_map(|caps| {
        let object: Map<String, Value> = serde_json::from_str(&caps[2]).ok()?;
        let joined: String = object.values().filter_map(Value::as_str).collect();
        if joined.len() >= MIN_WINDOW_TOKEN_LEN {
            TokenHit::new(TokenSource::WindowObject, &joined)
        } else {
            None
        }
    })
}

/// Fetches embed pages and extracts their token
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    transport: Transport,
    referer: String,
    /// Politeness delay before each page fetch
    rate_limit: Duration,
}

impl TokenExtractor {
    pub fn new(transport: Transport, referer: impl Into<String>, rate_limit: Duration) -> Self {
        Self {
            transport,
            referer: referer.into(),
            rate_limit,
        }
    }

    /// Fetch `url` and return the highest-priority token on the page
    pub async fn extract(&self, url: &str) -> Result<String, ResolveError> {
        if !self.rate_limit.is_zero() {
            sleep(self.rate_limit).await;
        }

        let response = self
            .transport
            .get_with_headers(url, &[("Referer", self.referer.as_str())])
            .await?;

        match find_token(&response.body) {
            Some(hit) => {
                debug!(url = %url, source = %hit.source, "Extracted token");
                Ok(hit.value)
            }
            None => Err(ResolveError::TokenNotFound {
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::test_transport;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WINDOW_TOKEN: &str = "aaaaBBBBccccDDDDeeee1234";

    fn page(head: &str, body: &str) -> String {
        format!("<!DOCTYPE html><html><head>{head}</head><body>{body}</body></html>")
    }

    #[test]
    fn test_meta_tag_beats_window_assignment() {
        let html = page(
            r#"<meta name="_gg_fb" content="meta-token">"#,
            &format!(r#"<script>window.client = "{WINDOW_TOKEN}";</script>"#),
        );
        let hit = find_token(&html).unwrap();
        assert_eq!(hit.source, TokenSource::MetaTag);
        assert_eq!(hit.value, "meta-token");
    }

    #[test]
    fn test_data_attribute() {
        let html = page("", r#"<div id="player" data-dpi="dpi-token"></div>"#);
        assert_eq!(
            find_token(&html),
            Some(TokenHit {
                source: TokenSource::DataAttribute,
                value: "dpi-token".to_string()
            })
        );
    }

    #[test]
    fn test_empty_meta_falls_through() {
        let html = page(
            r#"<meta name="_gg_fb" content="">"#,
            r#"<div data-dpi="dpi-token"></div>"#,
        );
        assert_eq!(find_token(&html).unwrap().source, TokenSource::DataAttribute);
    }

    #[test]
    fn test_script_nonce_requires_marker() {
        let html = page(
            "",
            r#"<script nonce="wrong">var x = 1;</script>
               <script nonce="nonce-token">/* empty nonce script */</script>"#,
        );
        let hit = find_token(&html).unwrap();
        assert_eq!(hit.source, TokenSource::ScriptNonce);
        assert_eq!(hit.value, "nonce-token");
    }

    #[test]
    fn test_window_string_skips_short_values() {
        let html = page(
            "",
            &format!(
                r#"<script>window.lang = "en"; window.token = '{WINDOW_TOKEN}';</script>"#
            ),
        );
        let hit = find_token(&html).unwrap();
        assert_eq!(hit.source, TokenSource::WindowString);
        assert_eq!(hit.value, WINDOW_TOKEN);
    }

    #[test]
    fn test_window_object_concatenates_in_source_order() {
        let html = page(
            "",
            r#"<script>window._xy_ws = {"z":"1234567890","a":"abcdefghij","n":5};</script>"#,
        );
        let hit = find_token(&html).unwrap();
        assert_eq!(hit.source, TokenSource::WindowObject);
        assert_eq!(hit.value, "1234567890abcdefghij");
    }

    #[test]
    fn test_short_window_object_is_ignored() {
        let html = page("", r#"<script>window.cfg = {"a":"short"};</script>"#);
        assert_eq!(find_token(&html), None);
    }

    #[test]
    fn test_comment_token() {
        let html = page("<!-- _is_th:comment-token_01 -->", "");
        let hit = find_token(&html).unwrap();
        assert_eq!(hit.source, TokenSource::Comment);
        assert_eq!(hit.value, "comment-token_01");
    }

    #[test]
    fn test_no_token() {
        assert_eq!(find_token(&page("<title>x</title>", "<p>nothing</p>")), None);
    }

    #[tokio::test]
    async fn test_extract_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/e-1/abc"))
            .and(header("referer", "https://site.test/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(page(r#"<meta name="_gg_fb" content="live-token">"#, "")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/e-1/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page("", "")))
            .mount(&server)
            .await;

        let extractor =
            TokenExtractor::new(test_transport(0), "https://site.test/", Duration::ZERO);

        let token = extractor
            .extract(&format!("{}/e-1/abc", server.uri()))
            .await
            .unwrap();
        assert_eq!(token, "live-token");

        let err = extractor
            .extract(&format!("{}/e-1/empty", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::TokenNotFound { .. }));
    }
}
