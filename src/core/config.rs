//! Runtime configuration of a tetrahedral complex.
//!
//! [`ComplexConfig`] is a plain value with a builder ([`ComplexConfigBuilder`])
//! and a few presets in [`config_presets`]. Two environment variables
//! override the defaults when a complex is built with
//! [`ComplexConfig::from_env`]:
//!
//! - `TETSTAR_SELF_CHECK`: re-validate every ring an edit touches.
//! - `TETSTAR_TRACE`: log every ring rewrite at `trace` level.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Returns true when the environment variable `name` is set to anything
/// other than `0`, `false`, or the empty string.
#[must_use]
pub fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|value| {
        let value = value.to_string_lossy();
        !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
    })
}

/// Whether per-ring edit tracing is enabled (`TETSTAR_TRACE`).
///
/// Read once per process.
#[must_use]
pub fn trace_enabled() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| env_flag("TETSTAR_TRACE"))
}

/// Knobs of a [`TetComplex`](crate::core::complex::TetComplex).
///
/// # Examples
///
/// ```rust
/// use tetstar::core::config::{ComplexConfig, ComplexConfigBuilder};
///
/// let config = ComplexConfigBuilder::default()
///     .self_check(true)
///     .build()
///     .unwrap();
/// assert!(config.self_check);
/// assert!(config.use_link_cache);
/// assert!(!config.paranoid);
/// ```
#[derive(Builder, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[builder(default)]
pub struct ComplexConfig {
    /// Re-parse every ring touched by an edit and panic if it violates the
    /// ring invariants.
    pub self_check: bool,
    /// Run a full consistency report after every successful edit and panic
    /// on any violation. Very slow; intended for tests.
    pub paranoid: bool,
    /// Route ring lookups through the 2D link cache.
    pub use_link_cache: bool,
}

impl Default for ComplexConfig {
    fn default() -> Self {
        Self {
            self_check: false,
            paranoid: false,
            use_link_cache: true,
        }
    }
}

impl ComplexConfig {
    /// Default configuration with `TETSTAR_SELF_CHECK` applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            self_check: env_flag("TETSTAR_SELF_CHECK"),
            ..Self::default()
        }
    }

    /// Preset without any checking.
    #[must_use]
    pub fn fast() -> Self {
        config_presets::fast()
    }

    /// Preset with every check enabled.
    #[must_use]
    pub fn paranoid() -> Self {
        config_presets::paranoid()
    }
}

/// Named configurations.
pub mod config_presets {
    use super::ComplexConfig;

    /// No checks, cache enabled.
    #[must_use]
    pub fn fast() -> ComplexConfig {
        ComplexConfig::default()
    }

    /// Ring self-checks and full consistency reports after every edit.
    #[must_use]
    pub fn paranoid() -> ComplexConfig {
        ComplexConfig {
            self_check: true,
            paranoid: true,
            use_link_cache: true,
        }
    }

    /// No cache; every ring lookup scans the owning vertex's 2D link.
    #[must_use]
    pub fn uncached() -> ComplexConfig {
        ComplexConfig {
            use_link_cache: false,
            ..ComplexConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(ComplexConfig::fast(), ComplexConfig::default());
        let paranoid = ComplexConfig::paranoid();
        assert!(paranoid.self_check && paranoid.paranoid);
        assert!(!config_presets::uncached().use_link_cache);
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let built = ComplexConfigBuilder::default().build().unwrap();
        assert_eq!(built, ComplexConfig::default());
    }

    #[test]
    fn test_env_flag_ignores_unset_variable() {
        assert!(!env_flag("TETSTAR_TEST_FLAG_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_serde_round_trip() {
        let config = ComplexConfig::paranoid();
        let json = serde_json::to_string(&config).unwrap();
        let back: ComplexConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
