//! Engine tuning parameters.
//!
//! All values have defaults that work well for a typical webcam setup, so hosts usually only
//! override individual fields:
//!
//! ```
//! # use zaru_overlay::config::EngineConfig;
//! let config = EngineConfig::from_json(r#"{ "smoothing": { "alpha": 0.5 } }"#).unwrap();
//! assert_eq!(config.smoothing.alpha, 0.5);
//! assert_eq!(config.render_interval_ms, 16);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, governor::DeviceClass};

/// Largest accepted render budget. Render ticks are never expected to take this long.
const MAX_FRAME_BUDGET_MS: f32 = 10_000.0;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub smoothing: SmoothingConfig,
    pub governor: GovernorConfig,
    pub render: RenderConfig,
    /// Interval between render ticks.
    pub render_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            smoothing: SmoothingConfig::default(),
            governor: GovernorConfig::default(),
            render: RenderConfig::default(),
            render_interval_ms: 16,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    /// Checks that all values are within their valid ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let alpha = self.smoothing.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        if self.render_interval_ms == 0 {
            return Err(invalid("render_interval_ms", "must be non-zero"));
        }
        self.governor.validate()?;
        self.render.validate()
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

/// Position smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Weight of the previous smoothed position, strictly between 0 and 1.
    ///
    /// Lower values follow the subject more closely, higher values suppress more jitter.
    pub alpha: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { alpha: 0.6 }
    }
}

/// Parameters of the [`PerformanceGovernor`][crate::governor::PerformanceGovernor].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Render cost above which a render tick counts as an overrun.
    pub frame_budget_ms: f32,
    /// Every this many consecutive empty or failed detection cycles, the detection interval is
    /// multiplied by `backoff_factor`.
    pub backoff_threshold: u32,
    pub backoff_factor: f32,
    /// Upper bound for the detection interval. Must not be shorter than the slowest tier interval.
    pub max_interval_ms: u64,
    /// Consecutive empty or failed detection cycles after which detection is turned off until the
    /// engine is restarted.
    pub disable_threshold: u32,
    /// Consecutive render overruns before the governor degrades quality or detection.
    pub render_overrun_threshold: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 16.0,
            backoff_threshold: 10,
            backoff_factor: 1.5,
            max_interval_ms: 500,
            disable_threshold: 60,
            render_overrun_threshold: 30,
        }
    }
}

impl GovernorConfig {
    pub fn frame_budget(&self) -> Duration {
        Duration::try_from_secs_f32(self.frame_budget_ms / 1000.0).unwrap_or(Duration::MAX)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frame_budget_ms > 0.0 && self.frame_budget_ms <= MAX_FRAME_BUDGET_MS) {
            return Err(invalid(
                "governor.frame_budget_ms",
                &format!("must be positive and at most {MAX_FRAME_BUDGET_MS}"),
            ));
        }
        let slowest = DeviceClass::Low.detection_interval();
        if self.max_interval() < slowest {
            return Err(invalid(
                "governor.max_interval_ms",
                &format!("must be at least {} ms", slowest.as_millis()),
            ));
        }
        if self.backoff_threshold == 0 {
            return Err(invalid("governor.backoff_threshold", "must be non-zero"));
        }
        if !(self.backoff_factor >= 1.0 && self.backoff_factor.is_finite()) {
            return Err(invalid("governor.backoff_factor", "must be at least 1.0"));
        }
        if self.disable_threshold <= self.backoff_threshold {
            return Err(invalid(
                "governor.disable_threshold",
                "must be greater than the backoff threshold",
            ));
        }
        if self.render_overrun_threshold == 0 {
            return Err(invalid("governor.render_overrun_threshold", "must be non-zero"));
        }
        Ok(())
    }
}

/// Parameters of the [`FilterRenderer`][crate::render::FilterRenderer].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Minimum opacity of filters attached to detected faces.
    pub floor_alpha: f32,
    /// Factor `k` in `size = base * clamp(k * face_width / capture_width, min, max)`.
    pub subject_scale_k: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Display width at which filters that don't scale with the subject are drawn at base size.
    pub reference_width: f32,
    /// Number of rendered sprites kept by the render cache.
    pub cache_capacity: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            floor_alpha: 0.6,
            subject_scale_k: 2.5,
            min_scale: 0.5,
            max_scale: 2.0,
            reference_width: 640.0,
            cache_capacity: 32,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.floor_alpha) {
            return Err(invalid("render.floor_alpha", "must lie in [0, 1]"));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(invalid(
                "render.min_scale",
                "must be positive and not exceed max_scale",
            ));
        }
        if !(self.subject_scale_k > 0.0 && self.reference_width > 0.0) {
            return Err(invalid(
                "render.subject_scale_k",
                "scale factors must be positive",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(invalid("render.cache_capacity", "must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "governor": { "backoff_factor": 2.0 } }"#).unwrap();
        assert_eq!(config.governor.backoff_factor, 2.0);
        assert_eq!(config.governor.backoff_threshold, 10);
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "smoothing": { "alpha": 1.0 } }"#),
            Err(ConfigError::InvalidAlpha(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "governor": { "disable_threshold": 5 } }"#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn governor_limits() {
        let field = |json: &str| match EngineConfig::from_json(json) {
            Err(ConfigError::InvalidValue { field, .. }) => Some(field),
            _ => None,
        };
        assert_eq!(
            field(r#"{ "governor": { "max_interval_ms": 20 } }"#),
            Some("governor.max_interval_ms")
        );
        assert_eq!(
            field(r#"{ "governor": { "max_interval_ms": 0 } }"#),
            Some("governor.max_interval_ms")
        );
        assert_eq!(
            field(r#"{ "governor": { "frame_budget_ms": 1e30 } }"#),
            Some("governor.frame_budget_ms")
        );
        assert_eq!(
            field(r#"{ "governor": { "frame_budget_ms": -1.0 } }"#),
            Some("governor.frame_budget_ms")
        );
        let config = EngineConfig::from_json(
            r#"{ "governor": { "max_interval_ms": 66, "frame_budget_ms": 10000.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.governor.max_interval(), Duration::from_millis(66));
    }

    #[test]
    fn oversized_budget_saturates() {
        let config = GovernorConfig {
            frame_budget_ms: 1e30,
            ..GovernorConfig::default()
        };
        assert_eq!(config.frame_budget(), Duration::MAX);
    }
}
