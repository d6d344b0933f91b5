//! Data models for the project.
//!
//! This module defines the identifiers used to address an episode and its
//! streaming servers, and the normalized stream descriptor returned to
//! CLI and API callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delimiter between the anime slug and the episode ordinal in an [`EpisodeRef`].
pub const EPISODE_DELIMITER: &str = "::ep=";

/// Errors raised while parsing model identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid episode ID format: '{0}' (expected <anime-slug>::ep=<number>)")]
    InvalidEpisodeRef(String),

    #[error("invalid server type: '{0}' (expected sub or dub)")]
    InvalidServerKind(String),
}

/// Episode identifier of the form `<anime-slug>::ep=<episode-number>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EpisodeRef {
    slug: String,
    episode: String,
}

impl EpisodeRef {
    /// Anime slug, e.g. `one-piece-100`.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Upstream episode ordinal, e.g. `2142`.
    pub fn episode(&self) -> &str {
        &self.episode
    }
}

impl FromStr for EpisodeRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(EPISODE_DELIMITER).collect();
        match parts.as_slice() {
            [slug, episode] if !slug.is_empty() && !episode.is_empty() => Ok(Self {
                slug: (*slug).to_string(),
                episode: (*episode).to_string(),
            }),
            _ => Err(ModelError::InvalidEpisodeRef(s.to_string())),
        }
    }
}

impl TryFrom<String> for EpisodeRef {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EpisodeRef> for String {
    fn from(value: EpisodeRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.slug, EPISODE_DELIMITER, self.episode)
    }
}

/// Audio track offering of a server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Sub,
    Dub,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Sub => "sub",
            ServerKind::Dub => "dub",
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sub" => Ok(ServerKind::Sub),
            "dub" => Ok(ServerKind::Dub),
            _ => Err(ModelError::InvalidServerKind(s.to_string())),
        }
    }
}

/// One streaming-server offering for one episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRef {
    /// Upstream opaque server id (`data-id` on the server list)
    pub id: String,
    /// Display name, e.g. `HD-1`
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServerKind,
    /// Position within its sub/dub list
    pub index: usize,
}

/// Servers available for an episode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServersResponse {
    pub episode: u32,
    pub sub: Vec<ServerRef>,
    pub dub: Vec<ServerRef>,
}

impl ServersResponse {
    /// Servers offered for the given kind
    pub fn of_kind(&self, kind: ServerKind) -> &[ServerRef] {
        match kind {
            ServerKind::Sub => &self.sub,
            ServerKind::Dub => &self.dub,
        }
    }
}

/// Playable stream link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamLink {
    pub file: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

/// Subtitle or thumbnail track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    pub file: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Skip range in seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u32,
    pub end: u32,
}

/// Normalized result of one successful stream resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: StreamLink,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro: Option<TimeRange>,
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe: Option<String>,
}

/// Envelope used by every REST response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
