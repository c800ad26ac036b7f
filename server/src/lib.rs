//! # Live-State Server Library
//!
//! This library holds the live state of running multiplayer sessions. Players
//! stream position and interaction updates over UDP; the server applies them
//! to an in-memory networking cache and periodically reconciles that cache
//! with a relational store.
//!
//! ## Data Flow
//!
//! ```text
//! UDP packet -> connector -> networking cache (metadata)
//!            -> reconciliation workers -> repository
//!            -> invalidation -> networking cache
//! ```
//!
//! The event engine mutates the metadata segment directly.
//!
//! ## Module Organization
//!
//! ### Networking Cache (`cache`)
//! Independent fixed-capacity LRU segments, each behind its own lock, with a
//! transaction API for read-modify-write sequences.
//!
//! ### Storage (`entity`, `db`, `repository`, `readthrough`)
//! Sea-ORM entities for sessions, lobbies, users and messages. Repository
//! writes evict the cached views depending on the written rows; the
//! read-through helpers fill them back in on demand.
//!
//! ### Connectors (`connector`)
//! The content channel receives encrypted, keyed updates and dispatches them
//! to the content handler. The metadata channel answers handshakes,
//! heartbeats and the session and lobby lifecycle requests.
//!
//! ### Workers (`workers`)
//! Periodic tasks that flush live state to storage, run world events and
//! publish storage counts to the monitoring gauges, which `monitoring` serves
//! over HTTP.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::cache::NetworkingCache;
//! use server::config::Config;
//! use server::connector::NetworkingConnector;
//! use server::db;
//! use server::repository::Repository;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::error::ServerError> {
//!     let config = Config::load()?;
//!     let connection = db::connect(
//!         &config.database_url,
//!         config.database_retry_delay(),
//!         config.database_retries,
//!     )
//!     .await?;
//!     db::create_schema(&connection).await?;
//!
//!     let cache = Arc::new(NetworkingCache::new(config.cache_limits())?);
//!     let repository = Repository::new(connection, cache);
//!
//!     let mut connector = NetworkingConnector::new(&config, repository);
//!     connector.connect().await?;
//!     connector.wait().await
//! }
//! ```

pub mod cache;
pub mod config;
pub mod connector;
pub mod db;
pub mod entity;
pub mod error;
pub mod generation;
pub mod monitoring;
pub mod readthrough;
pub mod repository;
pub mod utils;
pub mod workers;
