//! Command line configuration of the server binary.

use crate::error::ServerError;
use clap::Parser;
use shared::crypto::{derive_key, FrameKey};
use std::ffi::OsString;
use std::time::Duration;

/// Longest accepted encryption passphrase in bytes.
pub const MAX_KEY_LEN: usize = 64;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about = "Live-state server for multiplayer sessions")]
pub struct Config {
    /// IP address both UDP sockets bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,
    /// Port of the content channel
    #[clap(long, default_value = "8090")]
    pub content_port: u16,
    /// Port of the metadata (control) channel
    #[clap(long, default_value = "8091")]
    pub metadata_port: u16,
    /// Port of the HTTP endpoint serving `/metrics`
    #[clap(long, default_value = "8092")]
    pub monitoring_port: u16,
    /// Passphrase the frame key is derived from
    #[clap(long = "encryption-key", env = "SERVER_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_passphrase: String,

    /// Database connection string
    #[clap(long, default_value = "sqlite://live_state.db?mode=rwc")]
    pub database_url: String,
    /// Delay between database connection attempts
    #[clap(long, default_value = "3000")]
    pub database_retry_delay_ms: u64,
    /// Connection retries before giving up
    #[clap(long, default_value = "5")]
    pub database_retries: u32,

    /// Sessions kept live at once
    #[clap(long, default_value = "128")]
    pub max_sessions: usize,
    /// Players per session
    #[clap(long, default_value = "8")]
    pub max_session_players: usize,
    #[clap(long, default_value = "10")]
    pub max_chests: usize,
    #[clap(long, default_value = "6")]
    pub max_health_packs: usize,
    #[clap(long, default_value = "1280")]
    pub generation_width: f64,
    #[clap(long, default_value = "720")]
    pub generation_height: f64,
    /// Minimum distance between two generated items
    #[clap(long, default_value = "64")]
    pub generation_radius: f64,

    #[clap(long, default_value = "15")]
    pub sync_period_secs: u64,
    #[clap(long, default_value = "10")]
    pub activity_period_secs: u64,
    #[clap(long, default_value = "2")]
    pub events_period_secs: u64,
    #[clap(long, default_value = "10")]
    pub dashboards_period_secs: u64,

    #[clap(long, default_value = "20")]
    pub event_duration_secs: u64,
    /// Seconds between two hits of a running event
    #[clap(long, default_value = "2")]
    pub event_frequency_secs: u64,
    #[clap(long, default_value = "90")]
    pub event_pause_secs: u64,
    /// Health lost per event hit
    #[clap(long, default_value = "20")]
    pub event_hit_rate: u64,

    /// Health restored by a health pack
    #[clap(long, default_value = "30")]
    pub health_pack_rate: u64,
    /// How far from an item a player may open it
    #[clap(long, default_value = "48")]
    pub interaction_radius: f64,

    /// Health lost by each player caught by a fist hit
    #[clap(long, default_value = "10")]
    pub fist_hit_rate: u64,
    /// Reach of a fist hit
    #[clap(long, default_value = "48")]
    pub fist_hit_distance: f64,

    #[clap(skip)]
    encryption_key: FrameKey,
}

/// Bounds the networking cache segments are sized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_sessions: usize,
    pub max_session_players: usize,
}

impl CacheLimits {
    /// Capacity of segments holding one entry per session.
    pub fn session_capacity(&self) -> usize {
        self.max_sessions
    }

    /// Capacity of segments holding one entry per player.
    pub fn player_capacity(&self) -> usize {
        self.max_sessions.saturating_mul(self.max_session_players)
    }
}

/// Item placement and interaction parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub width: f64,
    pub height: f64,
    pub radius: f64,
    pub max_chests: usize,
    pub max_health_packs: usize,
    pub interaction_radius: f64,
    pub health_pack_rate: u64,
}

/// Player versus player parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatSettings {
    pub fist_rate: u64,
    pub fist_distance: f64,
}

impl Default for CombatSettings {
    fn default() -> Self {
        Self {
            fist_rate: 10,
            fist_distance: 48.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSettings {
    pub duration: Duration,
    pub frequency: Duration,
    pub pause: Duration,
    pub hit_rate: u64,
}

impl Config {
    /// Parses the process arguments and validates them.
    pub fn load() -> Result<Self, ServerError> {
        Self::finish(Self::parse())
    }

    /// Parses an explicit argument list, the first item being the binary name.
    pub fn from_args<I, T>(args: I) -> Result<Self, ServerError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args).map_err(|e| ServerError::Config(e.to_string()))?;
        Self::finish(config)
    }

    fn finish(mut config: Self) -> Result<Self, ServerError> {
        config.validate()?;
        config.encryption_key = derive_key(&config.encryption_passphrase);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let ports = [self.content_port, self.metadata_port, self.monitoring_port];
        if ports.contains(&0) {
            return Err(ServerError::Config("ports must be non-zero".to_string()));
        }
        if let Some(port) = ports
            .iter()
            .enumerate()
            .find_map(|(i, port)| ports[i + 1..].contains(port).then_some(*port))
        {
            return Err(ServerError::Config(format!(
                "content, metadata and monitoring ports must differ ({} is used twice)",
                port
            )));
        }
        if self.encryption_passphrase.is_empty() {
            return Err(ServerError::Config("encryption key is empty".to_string()));
        }
        if self.encryption_passphrase.len() > MAX_KEY_LEN {
            return Err(ServerError::Config(format!(
                "encryption key exceeds {} bytes",
                MAX_KEY_LEN
            )));
        }

        let limits = [
            ("max-sessions", self.max_sessions as u64),
            ("max-session-players", self.max_session_players as u64),
            ("sync-period-secs", self.sync_period_secs),
            ("activity-period-secs", self.activity_period_secs),
            ("events-period-secs", self.events_period_secs),
            ("dashboards-period-secs", self.dashboards_period_secs),
            ("event-frequency-secs", self.event_frequency_secs),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ServerError::Config(format!("{} must be greater than zero", name)));
        }

        let extents = [
            ("generation-width", self.generation_width),
            ("generation-height", self.generation_height),
            ("generation-radius", self.generation_radius),
        ];
        if let Some((name, _)) = extents
            .iter()
            .find(|(_, value)| !(value.is_finite() && *value > 0.0))
        {
            return Err(ServerError::Config(format!(
                "{} must be a finite number greater than zero",
                name
            )));
        }

        let reaches = [
            ("interaction-radius", self.interaction_radius),
            ("fist-hit-distance", self.fist_hit_distance),
        ];
        if let Some((name, _)) = reaches
            .iter()
            .find(|(_, value)| !(value.is_finite() && *value >= 0.0))
        {
            return Err(ServerError::Config(format!(
                "{} must be a finite, non-negative number",
                name
            )));
        }

        Ok(())
    }

    pub fn encryption_key(&self) -> &FrameKey {
        &self.encryption_key
    }

    pub fn content_address(&self) -> String {
        format!("{}:{}", self.host, self.content_port)
    }

    pub fn metadata_address(&self) -> String {
        format!("{}:{}", self.host, self.metadata_port)
    }

    pub fn monitoring_address(&self) -> String {
        format!("{}:{}", self.host, self.monitoring_port)
    }

    pub fn database_retry_delay(&self) -> Duration {
        Duration::from_millis(self.database_retry_delay_ms)
    }

    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn activity_period(&self) -> Duration {
        Duration::from_secs(self.activity_period_secs)
    }

    pub fn events_period(&self) -> Duration {
        Duration::from_secs(self.events_period_secs)
    }

    pub fn dashboards_period(&self) -> Duration {
        Duration::from_secs(self.dashboards_period_secs)
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_sessions: self.max_sessions,
            max_session_players: self.max_session_players,
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            width: self.generation_width,
            height: self.generation_height,
            radius: self.generation_radius,
            max_chests: self.max_chests,
            max_health_packs: self.max_health_packs,
            interaction_radius: self.interaction_radius,
            health_pack_rate: self.health_pack_rate,
        }
    }

    pub fn combat_settings(&self) -> CombatSettings {
        CombatSettings {
            fist_rate: self.fist_hit_rate,
            fist_distance: self.fist_hit_distance,
        }
    }

    pub fn event_settings(&self) -> EventSettings {
        EventSettings {
            duration: Duration::from_secs(self.event_duration_secs),
            frequency: Duration::from_secs(self.event_frequency_secs),
            pause: Duration::from_secs(self.event_pause_secs),
            hit_rate: self.event_hit_rate,
        }
    }
}
