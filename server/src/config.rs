//! Command-line configuration for the world server

use crate::world::WorldSettings;
use clap::{ArgAction, Parser};
use shared::{INTERACTION_RANGE_TILES, SAPLING_GROWTH_TICKS};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on (0 picks a free port)
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// World seed; ignored when an existing save is loaded
    #[clap(short, long, default_value = "12345")]
    pub seed: u64,
    /// Maximum number of concurrent connections
    #[clap(short, long, default_value = "32")]
    pub max_clients: usize,
    /// Only let owners remove their own fence pieces
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub enforce_ownership: bool,
    /// Re-derive neighbouring piece types when fences are placed or removed
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub auto_orient: bool,
    /// World save file; the world is not persisted when omitted
    #[clap(long)]
    pub save_path: Option<PathBuf>,
    /// Seconds between autosaves (0 disables)
    #[clap(long, default_value = "60")]
    pub autosave_secs: u64,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "20")]
    pub tick_rate: u32,
    /// Half-width, in tiles, of the square populated at world creation
    #[clap(long, default_value = "24")]
    pub init_radius: i32,
    /// Reach for attacks, pickups and planting, in tiles
    #[clap(long, default_value_t = INTERACTION_RANGE_TILES)]
    pub interaction_range: f32,
    /// Ticks a sapling needs to grow into a tree
    #[clap(long, default_value_t = SAPLING_GROWTH_TICKS)]
    pub sapling_growth_ticks: u32,
    /// Seconds of silence before a connection is dropped
    #[clap(long, default_value = "10")]
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            seed: 12345,
            max_clients: 32,
            enforce_ownership: true,
            auto_orient: true,
            save_path: None,
            autosave_secs: 60,
            tick_rate: 20,
            init_radius: 24,
            interaction_range: INTERACTION_RANGE_TILES,
            sapling_growth_ticks: SAPLING_GROWTH_TICKS,
            idle_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_secs > 0 && self.save_path.is_some())
            .then(|| Duration::from_secs(self.autosave_secs))
    }

    pub fn world_settings(&self) -> WorldSettings {
        WorldSettings {
            seed: self.seed,
            init_radius: self.init_radius.max(0),
            interaction_range_tiles: self.interaction_range.max(0.0),
            sapling_growth_ticks: self.sapling_growth_ticks.max(1),
        }
    }
}
