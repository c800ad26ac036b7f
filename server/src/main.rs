use env_logger::Env;
use log::{error, info};
use server::cache::NetworkingCache;
use server::config::Config;
use server::connector::NetworkingConnector;
use server::db;
use server::error::ServerError;
use server::monitoring::{self as metrics, Monitoring};
use server::repository::Repository;
use server::workers::{ActivitySync, DashboardsSync, EventEngine, RandomEventSelector, RepositorySync};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Main-method of the application.
/// Exits with a non-zero status as soon as any task fails.
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        error!("Server terminated: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = Config::load()?;

    let connection = db::connect(
        &config.database_url,
        config.database_retry_delay(),
        config.database_retries,
    )
    .await?;
    db::create_schema(&connection).await?;

    let cache = Arc::new(NetworkingCache::new(config.cache_limits())?);
    let repository = Repository::new(connection, Arc::clone(&cache));

    let monitoring = Monitoring::new()?;
    let dashboards = DashboardsSync::new(
        repository.clone(),
        monitoring.clone(),
        config.dashboards_period(),
    );
    dashboards.run_once().await?;

    let mut connector = NetworkingConnector::new(&config, repository.clone());
    let bound = connector.connect().await?;
    info!(
        "Serving content on {} and metadata on {}",
        bound.content, bound.metadata
    );

    let metrics_listener = TcpListener::bind(config.monitoring_address()).await?;
    let metrics_handle = tokio::spawn(metrics::serve(
        metrics_listener,
        monitoring,
        connector.cancellation().child_token(),
    ));

    let sync_handle = tokio::spawn(RepositorySync::new(repository.clone(), config.sync_period()).run());
    let activity_handle =
        tokio::spawn(ActivitySync::new(repository.clone(), config.activity_period()).run());
    let dashboards_handle = tokio::spawn(dashboards.run());
    let events_handle = tokio::spawn(
        EventEngine::new(
            Arc::clone(&cache),
            config.event_settings(),
            config.events_period(),
            RandomEventSelector,
        )
        .run(),
    );

    // Workers only return on failure. The connectors and the metrics endpoint
    // return on shutdown.
    tokio::select! {
        result = connector.wait() => {
            result?;
            info!("Connectors closed, shutting down");
        }
        result = sync_handle => result??,
        result = activity_handle => result??,
        result = events_handle => result??,
        result = dashboards_handle => result??,
        result = metrics_handle => result??,
    }

    Ok(())
}
