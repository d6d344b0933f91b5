//! Entry point tying server listing and stream resolution together.

use crate::decrypt::Derivation;
use crate::error::{ResolveError, TransportError};
use crate::keys::{KeyProvider, KeySource};
use crate::resolver::{select_server, Resolver};
use crate::servers::ServerLister;
use crate::strategies::{MegacloudStrategy, MirrorStrategy, PrimaryStrategy, Strategy};
use crate::token::TokenExtractor;
use crate::transport::Transport;
use shared::models::{EpisodeRef, ServerKind, ServersResponse, StreamDescriptor};
use shared::Config;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Server listing and stream resolution for the CLI and API
pub struct StreamService {
    servers: ServerLister,
    resolver: Resolver,
    /// Deadline for one complete resolution
    resolve_timeout: Duration,
}

impl StreamService {
    pub fn new(servers: ServerLister, resolver: Resolver, resolve_timeout: Duration) -> Self {
        Self {
            servers,
            resolver,
            resolve_timeout,
        }
    }

    /// Build the service and its strategy chain from configuration
    ///
    /// Strategy order: primary, then each configured mirror, then megacloud.
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        let transport = Transport::from_config(config)?;
        let site_base = config.site.base_url.trim_end_matches('/').to_string();
        let rate_limit = Duration::from_millis(config.resolver.rate_limit_ms);

        let tokens = TokenExtractor::new(transport.clone(), format!("{site_base}/"), rate_limit);
        let keys = KeyProvider::new(transport.clone());

        let derivation = config
            .resolver
            .primary_derivation
            .parse()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to pbkdf2 key derivation");
                Derivation::pbkdf2()
            });

        let mut strategies: Vec<Box<dyn Strategy>> = vec![Box::new(PrimaryStrategy::new(
            transport.clone(),
            tokens.clone(),
            keys.clone(),
            site_base.clone(),
            KeySource::PlainText(config.keys.primary_url.clone()),
            derivation,
        ))];

        for mirror in &config.resolver.mirrors {
            let key_source = mirror.key_name.as_ref().map(|field| KeySource::JsonField {
                url: config.keys.registry_url.clone(),
                field: field.clone(),
            });
            strategies.push(Box::new(MirrorStrategy::new(
                mirror.name.clone(),
                transport.clone(),
                keys.clone(),
                mirror.base_url.clone(),
                key_source,
            )));
        }

        strategies.push(Box::new(MegacloudStrategy::new(
            transport.clone(),
            tokens,
            keys,
            site_base.clone(),
            config.resolver.megacloud_base_url.clone(),
            KeySource::JsonField {
                url: config.keys.registry_url.clone(),
                field: config.keys.registry_field.clone(),
            },
        )));

        let resolver = Resolver::new(strategies);
        info!(strategies = ?resolver.strategy_names(), "Stream service ready");

        Ok(Self::new(
            ServerLister::new(transport, site_base, rate_limit),
            resolver,
            Duration::from_secs(config.resolver.resolve_timeout_secs),
        ))
    }

    /// List the servers of an episode
    pub async fn servers(&self, episode_id: &str) -> Result<ServersResponse, ResolveError> {
        let episode = parse_episode(episode_id)?;
        self.servers.list(&episode).await
    }

    /// Resolve the stream of one episode on the named server
    ///
    /// The episode id and server type are validated before any request is
    /// made. The configured timeout bounds all strategies together.
    pub async fn stream(
        &self,
        episode_id: &str,
        kind: &str,
        server_name: &str,
    ) -> Result<StreamDescriptor, ResolveError> {
        let episode = parse_episode(episode_id)?;
        let kind: ServerKind = kind
            .parse()
            .map_err(|_| ResolveError::ServerNotFound {
                name: server_name.to_string(),
                kind: kind.to_string(),
            })?;

        let servers = self.servers.list(&episode).await?;
        let server = select_server(&servers, kind, server_name)?;
        info!(episode = %episode, server = %server.name, kind = %kind, "Resolving stream");

        timeout(self.resolve_timeout, self.resolver.resolve(server, &episode))
            .await
            .map_err(|_| ResolveError::Timeout(self.resolve_timeout.as_secs()))?
    }
}

fn parse_episode(episode_id: &str) -> Result<EpisodeRef, ResolveError> {
    episode_id
        .parse()
        .map_err(|_| ResolveError::InvalidEpisodeFormat(episode_id.to_string()))
}
