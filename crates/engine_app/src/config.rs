//! Frame loop configuration.

use tracing::warn;

/// Environment variable overriding [`FrameConfig::tick_rate`].
pub const TICK_RATE_ENV: &str = "ENGINE_TICK_RATE";

/// Environment variable overriding [`FrameConfig::max_ticks`].
pub const MAX_TICKS_ENV: &str = "ENGINE_MAX_TICKS";

/// Configuration for the frame loop.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl FrameConfig {
    /// Defaults, overridden by `ENGINE_TICK_RATE` and `ENGINE_MAX_TICKS`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden by whatever `lookup` returns for each variable.
    /// Values that fail to parse are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(TICK_RATE_ENV) {
            match raw.trim().parse::<f64>() {
                Ok(rate) if rate.is_finite() && rate > 0.0 => config.tick_rate = rate,
                _ => warn!(var = TICK_RATE_ENV, value = %raw, "ignoring invalid tick rate"),
            }
        }

        if let Some(raw) = lookup(MAX_TICKS_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(max_ticks) => config.max_ticks = max_ticks,
                Err(err) => warn!(var = MAX_TICKS_ENV, value = %raw, error = %err, "ignoring invalid tick limit"),
            }
        }

        config
    }
}
