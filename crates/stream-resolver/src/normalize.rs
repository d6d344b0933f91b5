//! Maps a winning strategy's output onto [`StreamDescriptor`].

use crate::error::ResolveError;
use crate::payload::{RawSourcePayload, SourceItem};
use shared::models::{EpisodeRef, ServerRef, StreamDescriptor, StreamLink};

/// Link type used when the host does not name one.
const DEFAULT_LINK_TYPE: &str = "hls";

/// Build the canonical descriptor from a resolved source list
///
/// The first source becomes the link; further qualities are discarded.
pub fn normalize(
    sources: &[SourceItem],
    payload: &RawSourcePayload,
    episode: &EpisodeRef,
    server: &ServerRef,
    iframe: Option<&str>,
) -> Result<StreamDescriptor, ResolveError> {
    let first = sources.first().ok_or(ResolveError::NoSourcesFound)?;
    if first.file.trim().is_empty() {
        return Err(ResolveError::NoSourcesFound);
    }

    let link_type = if first.source_type.is_empty() {
        DEFAULT_LINK_TYPE.to_string()
    } else {
        first.source_type.clone()
    };

    Ok(StreamDescriptor {
        id: episode.to_string(),
        kind: server.kind.to_string(),
        link: StreamLink {
            file: first.file.clone(),
            link_type,
        },
        tracks: payload.tracks.clone(),
        intro: payload.intro,
        outro: payload.outro,
        server: server.name.clone(),
        iframe: iframe.map(str::to_string),
    })
}
