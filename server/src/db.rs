//! Database connection and schema bootstrap.

use crate::entity::{lobby, message, session, user};
use crate::error::ServerError;
use log::{info, warn};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};
use std::time::Duration;
use tokio::time::sleep;

/// Opens a connection, retrying up to `retries` times with `retry_delay` in
/// between.
pub async fn connect(
    url: &str,
    retry_delay: Duration,
    retries: u32,
) -> Result<DatabaseConnection, ServerError> {
    let mut options = ConnectOptions::new(url.to_string());
    options.sqlx_logging(false);
    if url.contains(":memory:") {
        // Every pooled connection to an in-memory database is a separate database.
        options.max_connections(1).min_connections(1);
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        match Database::connect(options.clone()).await {
            Ok(connection) => {
                info!("Connected to database after {} attempt(s)", attempts);
                return Ok(connection);
            }
            Err(e) if attempts <= retries => {
                warn!(
                    "Database connection attempt {} failed: {}; retrying in {:?}",
                    attempts, e, retry_delay
                );
                sleep(retry_delay).await;
            }
            Err(source) => return Err(ServerError::DatabaseUnavailable { attempts, source }),
        }
    }
}

/// Creates every table that does not exist yet.
pub async fn create_schema(connection: &DatabaseConnection) -> Result<(), ServerError> {
    create_table(connection, user::Entity).await?;
    create_table(connection, session::Entity).await?;
    create_table(connection, lobby::Entity).await?;
    create_table(connection, message::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(
    connection: &DatabaseConnection,
    entity: E,
) -> Result<(), ServerError> {
    let backend = connection.get_database_backend();
    let mut statement = Schema::new(backend).create_table_from_entity(entity);
    statement.if_not_exists();
    connection.execute(backend.build(&statement)).await?;
    Ok(())
}
