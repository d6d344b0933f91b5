//! Stream resolver library for turning an episode server into a playable link.
//!
//! This library lists the streaming servers of an episode and resolves a
//! chosen server through a chain of embed-host strategies, decrypting the
//! upstream source payload where needed.

pub mod decrypt;
pub mod error;
pub mod keys;
pub mod normalize;
pub mod payload;
pub mod resolver;
pub mod servers;
pub mod service;
pub mod strategies;
pub mod token;
pub mod transport;

pub use decrypt::Derivation;
pub use error::{DecryptError, ResolveError, TransportError};
pub use keys::{DecryptionKey, KeyProvider, KeySource};
pub use resolver::{select_server, Resolver};
pub use servers::ServerLister;
pub use service::StreamService;
pub use strategies::Strategy;
pub use token::{find_token, TokenExtractor};
pub use transport::Transport;
