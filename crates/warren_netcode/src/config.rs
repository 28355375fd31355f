//! Simulation configuration.
//!
//! Everything that shapes the ring buffers and the physics integration is
//! decided here, at startup. The snapshot ring length in particular is a
//! function of the rollback window and is fixed for the lifetime of the
//! simulation.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a [`SimConfig`] from a TOML file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file was read but is not valid TOML for [`SimConfig`].
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level simulation tuning.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed simulation rate in ticks per second.
    pub tick_rate: u32,

    /// Maximum number of concurrently connected players.
    pub max_players: usize,

    /// How far into the past a late input may rewind the simulation, in
    /// milliseconds. Latency compensation is also capped at this value.
    pub max_rollback_ms: u32,

    /// Minimum span of history to retain, in milliseconds, regardless of
    /// the rollback cap. Past-state queries are answered from this window.
    pub min_window_ms: u32,

    /// How many ticks ahead of the present an input may target.
    pub future_slack: u32,

    /// Maximum distance, in ticks, between a client's claimed tick and the
    /// latency-compensated reference tick before the claim is overridden.
    pub max_input_shift: i64,

    /// Capacity of the bounded input delivery channel. A full channel
    /// blocks the sending session thread rather than dropping inputs.
    pub input_channel_capacity: usize,

    /// World and movement tuning.
    pub world: WorldConfig,
}

/// World geometry and movement tuning.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World extent along X. Positions wrap around this span.
    pub width: f32,

    /// World extent along Z. Positions wrap around this span.
    pub depth: f32,

    /// Lowest permitted Y coordinate.
    pub min_y: f32,

    /// Highest permitted Y coordinate.
    pub max_y: f32,

    /// Downward acceleration in units per second squared.
    pub gravity: f32,

    /// Top horizontal movement speed in units per second.
    pub max_speed: f32,

    /// Horizontal acceleration toward the target motion, in units per
    /// second squared.
    pub acceleration: f32,

    /// Initial upward speed of a jump, in units per second.
    pub jump_speed: f32,

    /// Grace period after losing ground contact during which a jump is
    /// still honoured, in seconds.
    pub ground_leniency: f32,

    /// Grace period after a jump during which upward control is retained,
    /// in seconds.
    pub jump_control_leniency: f32,

    /// Y coordinate newly spawned avatars are placed at.
    pub spawn_height: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_players: 8,
            max_rollback_ms: 1000,
            min_window_ms: 5000,
            future_slack: 20,
            max_input_shift: 15,
            input_channel_capacity: 256,
            world: WorldConfig::default(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 512.0,
            depth: 512.0,
            min_y: 0.0,
            max_y: 200.0,
            gravity: 250.0,
            max_speed: 100.0,
            acceleration: 400.0,
            jump_speed: 110.0,
            ground_leniency: 0.1,
            jump_control_leniency: 0.1,
            spawn_height: 5.0,
        }
    }
}

impl SimConfig {
    /// Loads a configuration from a TOML file. Missing fields fall back to
    /// their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Parses a configuration from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Number of slots in the snapshot and input-history rings.
    ///
    /// The ring must cover twice the rollback span (so a full-length rewind
    /// still has replay headroom) or the minimum history window, whichever
    /// is larger, plus slack for future-targeted inputs.
    #[must_use]
    pub fn ring_len(&self) -> usize {
        let window_ms = (2 * self.max_rollback_ms).max(self.min_window_ms);
        (window_ms * self.tick_rate / 1000 + self.future_slack) as usize
    }

    /// Simulated seconds covered by one tick.
    #[must_use]
    pub fn seconds_per_tick(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Wall-clock interval between ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ring_len() {
        // 5000ms window at 60Hz plus 20 future slots.
        assert_eq!(SimConfig::default().ring_len(), 320);
    }

    #[test]
    fn test_rollback_window_dominates_when_larger() {
        let config = SimConfig {
            max_rollback_ms: 4000,
            ..SimConfig::default()
        };
        // 2 * 4000ms beats the 5000ms minimum window.
        assert_eq!(config.ring_len(), 8000 * 60 / 1000 + 20);
    }

    #[test]
    fn test_toml_overrides_and_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            tick_rate = 30
            max_players = 4

            [world]
            gravity = 100.0
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_players, 4);
        assert_eq!(config.world.gravity, 100.0);
        // Untouched fields keep their defaults.
        assert_eq!(config.max_rollback_ms, 1000);
        assert_eq!(config.world.max_speed, 100.0);
    }

    #[test]
    fn test_toml_rejects_garbage() {
        assert!(SimConfig::from_toml_str("tick_rate = \"fast\"").is_err());
    }
}
