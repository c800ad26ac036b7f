use super::{flush_metadata, ticker, FlushMode};
use crate::error::ServerError;
use crate::repository::Repository;
use log::info;
use std::time::Duration;

/// Persists health, elimination and position more often than the full sync.
pub struct ActivitySync {
    repository: Repository,
    period: Duration,
}

impl ActivitySync {
    pub fn new(repository: Repository, period: Duration) -> Self {
        Self { repository, period }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        info!("Activity sync running every {:?}", self.period);
        let mut ticker = ticker(self.period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tick().await?;
        }
    }

    pub async fn tick(&self) -> Result<usize, ServerError> {
        flush_metadata(&self.repository, FlushMode::Activity).await
    }
}
