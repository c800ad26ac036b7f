use super::ticker;
use crate::error::ServerError;
use crate::monitoring::Monitoring;
use crate::repository::Repository;
use log::{debug, info};
use std::time::Duration;

/// Publishes storage counts to the monitoring gauges.
pub struct DashboardsSync {
    repository: Repository,
    monitoring: Monitoring,
    period: Duration,
}

impl DashboardsSync {
    pub fn new(repository: Repository, monitoring: Monitoring, period: Duration) -> Self {
        Self {
            repository,
            monitoring,
            period,
        }
    }

    pub async fn run(self) -> Result<(), ServerError> {
        info!("Dashboards sync running every {:?}", self.period);
        let mut ticker = ticker(self.period);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.run_once().await?;
        }
    }

    pub async fn run_once(&self) -> Result<(), ServerError> {
        let sessions = self.repository.sessions().count().await?;
        let lobbies = self.repository.lobbies().count().await?;

        self.monitoring
            .set_available_sessions(i64::try_from(sessions).unwrap_or(i64::MAX));
        self.monitoring
            .set_available_lobbies(i64::try_from(lobbies).unwrap_or(i64::MAX));

        debug!("Dashboards updated: {} sessions, {} lobbies", sessions, lobbies);
        Ok(())
    }
}
