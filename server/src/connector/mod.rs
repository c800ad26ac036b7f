//! UDP front door of the server.
//!
//! The content channel carries keyed, encrypted player updates into the
//! networking cache. The metadata channel answers handshakes, heartbeats and
//! the session and lobby lifecycle requests.
//! [`NetworkingConnector`] runs both and shares one cancellation token
//! between them.

mod content;
mod control;
mod handler;
mod metadata;

pub use content::ContentConnector;
pub use control::ControlHandler;
pub use handler::ContentHandler;
pub use metadata::MetadataConnector;

use crate::config::Config;
use crate::error::ServerError;
use crate::repository::Repository;
use log::error;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Addresses the connectors ended up bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddresses {
    pub content: SocketAddr,
    pub metadata: SocketAddr,
}

pub struct NetworkingConnector {
    content: ContentConnector,
    metadata: MetadataConnector,
}

impl NetworkingConnector {
    pub fn new(config: &Config, repository: Repository) -> Self {
        let key = *config.encryption_key();
        let handler = ContentHandler::new(repository.clone(), config.generation_settings())
            .with_combat(config.combat_settings());
        let content = ContentConnector::new(config.content_address(), key, handler);
        let metadata = MetadataConnector::new(
            config.metadata_address(),
            key,
            ControlHandler::new(repository, config.max_session_players),
            content.cancellation().child_token(),
        );

        Self { content, metadata }
    }

    /// Starts the content channel, then the metadata channel. The content
    /// channel is closed again when the metadata channel cannot start.
    pub async fn connect(&mut self) -> Result<BoundAddresses, ServerError> {
        let content = self.content.connect().await?;
        let metadata = match self.metadata.connect().await {
            Ok(addr) => addr,
            Err(e) => {
                error!("Metadata connector failed to start: {}", e);
                self.content.close();
                self.content.wait().await?;
                return Err(e);
            }
        };

        Ok(BoundAddresses { content, metadata })
    }

    pub fn close(&self) {
        self.content.close();
        self.metadata.close();
    }

    /// Token cancelled when the connectors shut down.
    pub fn cancellation(&self) -> &CancellationToken {
        self.content.cancellation()
    }

    /// Waits until both channels have stopped.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        let content = self.content.wait().await;
        if content.is_err() {
            self.metadata.close();
        }
        let metadata = self.metadata.wait().await;
        content.and(metadata)
    }
}
