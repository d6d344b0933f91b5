//! Upstream `getSources` payload model.

use serde::{Deserialize, Deserializer};
use shared::models::{TimeRange, Track};

/// Raw `getSources` response from an embed host
#[derive(Debug, Clone, Deserialize)]
pub struct RawSourcePayload {
    pub sources: Sources,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default, deserialize_with = "skip_range")]
    pub intro: Option<TimeRange>,
    #[serde(default, deserialize_with = "skip_range")]
    pub outro: Option<TimeRange>,
}

/// Source list, either plain or still encrypted
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireSources")]
pub enum Sources {
    Encrypted(String),
    Plain(Vec<SourceItem>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireSources {
    Text(String),
    List(Vec<SourceItem>),
    One(SourceItem),
}

impl From<WireSources> for Sources {
    fn from(wire: WireSources) -> Self {
        match wire {
            WireSources::Text(ciphertext) => Sources::Encrypted(ciphertext),
            WireSources::List(items) => Sources::Plain(items),
            WireSources::One(item) => Sources::Plain(vec![item]),
        }
    }
}

/// One playable source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceItem {
    pub file: String,
    #[serde(rename = "type", default)]
    pub source_type: String,
}

/// Parse a decrypted source list
pub fn parse_source_list(json: &str) -> Result<Vec<SourceItem>, serde_json::Error> {
    match serde_json::from_str::<WireSources>(json)? {
        WireSources::List(items) => Ok(items),
        WireSources::One(item) => Ok(vec![item]),
        WireSources::Text(_) => Err(serde::de::Error::custom(
            "expected a source list, found a string",
        )),
    }
}

#[derive(Deserialize)]
struct WireRange {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
}

/// Hosts send skip ranges as fractional seconds, `null`, or `{0, 0}` when absent.
fn skip_range<'de, D>(deserializer: D) -> Result<Option<TimeRange>, D::Error>
where
    D: Deserializer<'de>,
{
    let range = Option::<WireRange>::deserialize(deserializer)?;
    Ok(range.and_then(|r| {
        let (start, end) = (r.start.max(0.0) as u32, r.end.max(0.0) as u32);
        if start == 0 && end == 0 {
            None
        } else {
            Some(TimeRange { start, end })
        }
    }))
}
