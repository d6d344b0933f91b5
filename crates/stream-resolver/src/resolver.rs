//! Ordered fallback over extraction strategies.

use crate::error::ResolveError;
use crate::strategies::Strategy;
use shared::models::{EpisodeRef, ServerKind, ServerRef, ServersResponse, StreamDescriptor};
use tracing::{debug, info, warn};

/// Tries each strategy in order until one yields a playable link
pub struct Resolver {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Resolver {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolve `server` into a stream descriptor
    ///
    /// Strategies run strictly one after another. A failure moves on to
    /// the next strategy; when all have failed the last error is returned
    /// wrapped in [`ResolveError::AllStrategiesExhausted`].
    pub async fn resolve(
        &self,
        server: &ServerRef,
        episode: &EpisodeRef,
    ) -> Result<StreamDescriptor, ResolveError> {
        let mut last: Option<(String, ResolveError)> = None;

        for strategy in &self.strategies {
            let name = strategy.name();
            debug!(strategy = %name, server = %server.name, episode = %episode, "Trying strategy");

            let error = match strategy.resolve(server, episode).await {
                Ok(descriptor) if !descriptor.link.file.is_empty() => {
                    info!(
                        strategy = %name,
                        server = %server.name,
                        episode = %episode,
                        "Resolved stream"
                    );
                    return Ok(descriptor);
                }
                Ok(_) => ResolveError::NoSourcesFound,
                Err(e) => e,
            };

            warn!(strategy = %name, error = %error, "Strategy failed");
            last = Some((name.to_string(), error));
        }

        let (strategy, last) = last.unwrap_or_else(|| ("none".to_string(), ResolveError::NoSourcesFound));
        Err(ResolveError::AllStrategiesExhausted {
            strategy,
            last: Box::new(last),
        })
    }
}

/// Pick the server named `name` (case-insensitive) among those of `kind`
pub fn select_server<'a>(
    servers: &'a ServersResponse,
    kind: ServerKind,
    name: &str,
) -> Result<&'a ServerRef, ResolveError> {
    servers
        .of_kind(kind)
        .iter()
        .find(|server| server.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| ResolveError::server_not_found(name, kind))
}
