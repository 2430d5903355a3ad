//! Device-tiered performance control.
//!
//! The [`PerformanceGovernor`] picks a detection cadence and input resolution from a coarse
//! device classification and then adapts them (and the render quality) to what it observes at
//! runtime:
//!
//! - Sustained empty or failed detection cycles back the detection interval off multiplicatively,
//!   and eventually switch detection off until the engine is restarted.
//! - Sustained render overruns first disable expensive visual effects, then reduce detection
//!   cost.

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{config::GovernorConfig, error::ParseError};

/// Detector input sizes, in ascending order.
const INPUT_SIZES: [u32; 3] = [128, 160, 224];

/// Coarse device capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Low,
    Medium,
    High,
}

impl DeviceClass {
    pub const ALL: &'static [DeviceClass] = &[Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Recommended interval between detection cycles (~15, ~20 and ~30 Hz).
    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(match self {
            Self::Low => 66,
            Self::Medium => 50,
            Self::High => 33,
        })
    }

    /// Recommended detector input size.
    pub fn detection_input_size(&self) -> u32 {
        match self {
            Self::Low => 128,
            Self::Medium => 160,
            Self::High => 224,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::new("device class", s))
    }
}

/// Effective network connection type, as reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetworkClass {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl FromStr for NetworkClass {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "slow-2g" => Self::Slow2g,
            "2g" => Self::TwoG,
            "3g" => Self::ThreeG,
            "4g" => Self::FourG,
            "" | "unknown" => Self::Unknown,
            _ => return Err(ParseError::new("network class", s)),
        })
    }
}

/// Result of the host's one-time device capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Approximate device memory in GiB, if known.
    pub memory_gb: Option<f32>,
    /// Number of logical CPU cores, if known.
    pub logical_cores: Option<u32>,
    #[serde(default)]
    pub network: NetworkClass,
}

impl DeviceCapabilities {
    /// Classifies the device.
    ///
    /// Any single weak signal (little memory, few cores, a slow network) makes the device
    /// [`DeviceClass::Low`]. Only devices that are known to be strong on every axis are
    /// [`DeviceClass::High`]. Unknown values neither promote nor demote.
    pub fn classify(&self) -> DeviceClass {
        let low_memory = self.memory_gb.map_or(false, |gb| gb <= 2.0);
        let low_cores = self.logical_cores.map_or(false, |n| n <= 2);
        let slow_network = matches!(self.network, NetworkClass::Slow2g | NetworkClass::TwoG);
        if low_memory || low_cores || slow_network {
            return DeviceClass::Low;
        }

        let high_memory = self.memory_gb.map_or(false, |gb| gb >= 8.0);
        let high_cores = self.logical_cores.map_or(false, |n| n >= 8);
        let fast_network = matches!(self.network, NetworkClass::FourG | NetworkClass::Unknown);
        if high_memory && high_cores && fast_network {
            DeviceClass::High
        } else {
            DeviceClass::Medium
        }
    }
}

/// Whether expensive visual effects (drop shadow, outline) are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderQuality {
    High,
    Low,
}

impl RenderQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for RenderQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderQuality {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            _ => Err(ParseError::new("render quality", s)),
        }
    }
}

/// The parameters the engine currently runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceProfile {
    pub device_class: DeviceClass,
    pub detection_interval: Duration,
    pub detection_input_size: u32,
    pub render_quality: RenderQuality,
    pub cache_enabled: bool,
    pub detection_enabled: bool,
}

impl PerformanceProfile {
    /// Returns the initial profile for a device class.
    pub fn for_class(device_class: DeviceClass) -> Self {
        Self {
            device_class,
            detection_interval: device_class.detection_interval(),
            detection_input_size: device_class.detection_input_size(),
            render_quality: match device_class {
                DeviceClass::Low => RenderQuality::Low,
                DeviceClass::Medium | DeviceClass::High => RenderQuality::High,
            },
            cache_enabled: device_class == DeviceClass::Low,
            detection_enabled: true,
        }
    }
}

/// What a detection cycle produced, as far as the governor is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The detector returned this many faces (0 counts as [`CycleOutcome::Empty`]).
    Faces(usize),
    Empty,
    Failed,
    /// The detector reported that it will never work.
    Unavailable,
}

/// Adapts the [`PerformanceProfile`] to observed runtime behavior.
#[derive(Debug, Clone)]
pub struct PerformanceGovernor {
    config: GovernorConfig,
    profile: PerformanceProfile,
    /// Detection interval to return to once faces are found again.
    base_interval: Duration,
    /// Consecutive empty or failed detection cycles.
    misses: u32,
    /// Consecutive render ticks over budget.
    overruns: u32,
    unavailable: bool,
}

impl PerformanceGovernor {
    /// Creates a governor for a device with the given capabilities.
    pub fn new(capabilities: &DeviceCapabilities, config: GovernorConfig) -> Self {
        let class = capabilities.classify();
        log::info!("device class: {class} ({capabilities:?})");
        Self::with_profile(PerformanceProfile::for_class(class), config)
    }

    /// Creates a governor starting from an explicit profile.
    pub fn with_profile(profile: PerformanceProfile, config: GovernorConfig) -> Self {
        Self {
            config,
            base_interval: profile.detection_interval,
            profile,
            misses: 0,
            overruns: 0,
            unavailable: false,
        }
    }

    pub fn profile(&self) -> &PerformanceProfile {
        &self.profile
    }

    /// Returns the current detection interval, or `None` if detection is disabled.
    pub fn detection_interval(&self) -> Option<Duration> {
        self.profile
            .detection_enabled
            .then_some(self.profile.detection_interval)
    }

    /// Returns the number of consecutive empty or failed detection cycles.
    pub fn consecutive_misses(&self) -> u32 {
        self.misses
    }

    /// Records the outcome of a detection cycle.
    pub fn record_detection(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Faces(n) if n > 0 => {
                if self.misses > 0 {
                    log::debug!("faces found again after {} empty cycles", self.misses);
                }
                self.misses = 0;
                self.profile.detection_interval = self.base_interval;
            }
            CycleOutcome::Faces(_) | CycleOutcome::Empty | CycleOutcome::Failed => {
                self.misses += 1;
                if !self.profile.detection_enabled {
                    return;
                }

                if self.misses >= self.config.disable_threshold {
                    log::warn!(
                        "no faces in {} consecutive detection cycles, disabling detection",
                        self.misses
                    );
                    self.profile.detection_enabled = false;
                } else if self.misses % self.config.backoff_threshold == 0 {
                    let factor = self.config.backoff_factor;
                    let interval =
                        scale(self.profile.detection_interval, factor).min(self.interval_cap());
                    log::info!(
                        "{} empty detection cycles, backing off to {:?}",
                        self.misses,
                        interval
                    );
                    self.profile.detection_interval = interval;
                }
            }
            CycleOutcome::Unavailable => {
                if !self.unavailable {
                    log::warn!("face detection unavailable, using fallback positions");
                }
                self.unavailable = true;
                self.profile.detection_enabled = false;
            }
        }
    }

    /// Records how long a render tick took.
    pub fn record_render(&mut self, cost: Duration) {
        if cost > self.config.frame_budget() {
            self.overruns += 1;
        } else {
            self.overruns = 0;
        }

        if self.overruns < self.config.render_overrun_threshold {
            return;
        }
        self.overruns = 0;

        if self.profile.render_quality == RenderQuality::High {
            log::info!("render over budget, disabling visual effects and enabling sprite cache");
            self.profile.render_quality = RenderQuality::Low;
            self.profile.cache_enabled = true;
            return;
        }

        let base = scale(self.base_interval, self.config.backoff_factor).min(self.interval_cap());
        let input_size = INPUT_SIZES
            .iter()
            .rev()
            .copied()
            .find(|&size| size < self.profile.detection_input_size)
            .unwrap_or(INPUT_SIZES[0]);
        log::info!(
            "render still over budget, reducing detection to {:?} @ {}",
            base,
            input_size
        );
        self.base_interval = base;
        self.profile.detection_interval = self.profile.detection_interval.max(base);
        self.profile.detection_input_size = input_size;
    }

    /// Longest detection interval the backoff may reach. Never below the current baseline.
    fn interval_cap(&self) -> Duration {
        self.config.max_interval().max(self.base_interval)
    }

    /// Re-enables detection after it was switched off by the backoff.
    ///
    /// Has no effect on detectors that reported themselves as unavailable.
    pub fn restart(&mut self) {
        self.misses = 0;
        self.profile.detection_interval = self.base_interval;
        if !self.unavailable {
            self.profile.detection_enabled = true;
        }
    }
}

/// Multiplies a duration, rounding to whole nanoseconds.
fn scale(duration: Duration, factor: f32) -> Duration {
    Duration::from_nanos((duration.as_nanos() as f64 * f64::from(factor)).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(class: DeviceClass) -> PerformanceGovernor {
        PerformanceGovernor::with_profile(
            PerformanceProfile::for_class(class),
            GovernorConfig::default(),
        )
    }

    #[test]
    fn classification() {
        let caps = |memory_gb, logical_cores, network| DeviceCapabilities {
            memory_gb,
            logical_cores,
            network,
        };
        use NetworkClass::*;
        assert_eq!(caps(Some(16.0), Some(12), FourG).classify(), DeviceClass::High);
        assert_eq!(caps(Some(16.0), Some(12), Unknown).classify(), DeviceClass::High);
        assert_eq!(caps(Some(16.0), Some(12), ThreeG).classify(), DeviceClass::Medium);
        assert_eq!(caps(Some(4.0), Some(8), FourG).classify(), DeviceClass::Medium);
        assert_eq!(caps(None, None, Unknown).classify(), DeviceClass::Medium);
        assert_eq!(caps(Some(2.0), Some(8), FourG).classify(), DeviceClass::Low);
        assert_eq!(caps(Some(8.0), Some(2), FourG).classify(), DeviceClass::Low);
        assert_eq!(caps(Some(8.0), Some(8), Slow2g).classify(), DeviceClass::Low);
    }

    #[test]
    fn tier_parameters() {
        let high = PerformanceProfile::for_class(DeviceClass::High);
        assert_eq!(high.detection_interval, Duration::from_millis(33));
        assert_eq!(high.detection_input_size, 224);
        let medium = PerformanceProfile::for_class(DeviceClass::Medium);
        assert_eq!(medium.detection_interval, Duration::from_millis(50));
        assert_eq!(medium.detection_input_size, 160);
        let low = PerformanceProfile::for_class(DeviceClass::Low);
        assert_eq!(low.detection_interval, Duration::from_millis(66));
        assert_eq!(low.detection_input_size, 128);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("High".parse::<DeviceClass>().unwrap(), DeviceClass::High);
        assert_eq!(DeviceClass::Low.to_string(), "low");
        assert!("huge".parse::<DeviceClass>().is_err());
        assert_eq!("slow-2g".parse::<NetworkClass>().unwrap(), NetworkClass::Slow2g);
        assert_eq!("low".parse::<RenderQuality>().unwrap(), RenderQuality::Low);
        assert_eq!(
            "5g".parse::<NetworkClass>().unwrap_err().to_string(),
            "unknown network class `5g`"
        );
    }

    #[test]
    fn backoff_after_threshold() {
        let mut gov = governor(DeviceClass::Medium);
        for _ in 0..9 {
            gov.record_detection(CycleOutcome::Empty);
        }
        assert_eq!(gov.profile().detection_interval, Duration::from_millis(50));
        gov.record_detection(CycleOutcome::Failed);
        assert_eq!(gov.profile().detection_interval, Duration::from_millis(75));
        for _ in 0..10 {
            gov.record_detection(CycleOutcome::Empty);
        }
        assert_eq!(
            gov.profile().detection_interval,
            Duration::from_micros(112_500)
        );
    }

    #[test]
    fn backoff_is_capped() {
        let config = GovernorConfig {
            disable_threshold: 1000,
            ..GovernorConfig::default()
        };
        let mut gov =
            PerformanceGovernor::with_profile(PerformanceProfile::for_class(DeviceClass::Low), config);
        for _ in 0..500 {
            gov.record_detection(CycleOutcome::Empty);
        }
        assert_eq!(gov.profile().detection_interval, Duration::from_millis(500));
        assert!(gov.profile().detection_enabled);
    }

    #[test]
    fn cap_below_baseline_never_speeds_up_detection() {
        for max_interval_ms in [0, 20] {
            let config = GovernorConfig {
                max_interval_ms,
                ..GovernorConfig::default()
            };
            let mut gov = PerformanceGovernor::with_profile(
                PerformanceProfile::for_class(DeviceClass::Medium),
                config,
            );
            for _ in 0..30 {
                gov.record_detection(CycleOutcome::Empty);
            }
            assert_eq!(gov.detection_interval(), Some(Duration::from_millis(50)));
        }
    }

    #[test]
    fn faces_reset_backoff() {
        let mut gov = governor(DeviceClass::High);
        for _ in 0..25 {
            gov.record_detection(CycleOutcome::Empty);
        }
        assert!(gov.profile().detection_interval > Duration::from_millis(33));
        gov.record_detection(CycleOutcome::Faces(1));
        assert_eq!(gov.consecutive_misses(), 0);
        assert_eq!(gov.profile().detection_interval, Duration::from_millis(33));
    }

    #[test]
    fn disables_and_restarts() {
        let mut gov = governor(DeviceClass::High);
        for _ in 0..59 {
            gov.record_detection(CycleOutcome::Empty);
        }
        assert!(gov.detection_interval().is_some());
        gov.record_detection(CycleOutcome::Faces(0));
        assert_eq!(gov.detection_interval(), None);

        gov.restart();
        assert_eq!(gov.detection_interval(), Some(Duration::from_millis(33)));
    }

    #[test]
    fn unavailable_is_permanent() {
        let mut gov = governor(DeviceClass::High);
        gov.record_detection(CycleOutcome::Unavailable);
        assert_eq!(gov.detection_interval(), None);
        gov.restart();
        assert_eq!(gov.detection_interval(), None);
    }

    #[test]
    fn render_overruns_disable_effects_first() {
        let mut gov = governor(DeviceClass::High);
        let slow = Duration::from_millis(40);

        for _ in 0..29 {
            gov.record_render(slow);
        }
        // An in-budget frame resets the streak.
        gov.record_render(Duration::from_millis(5));
        for _ in 0..29 {
            gov.record_render(slow);
        }
        assert_eq!(gov.profile().render_quality, RenderQuality::High);

        gov.record_render(slow);
        assert_eq!(gov.profile().render_quality, RenderQuality::Low);
        assert!(gov.profile().cache_enabled);
        assert_eq!(gov.profile().detection_input_size, 224);

        for _ in 0..30 {
            gov.record_render(slow);
        }
        assert_eq!(gov.profile().detection_input_size, 160);
        assert_eq!(gov.profile().detection_interval, Duration::from_micros(49_500));

        for _ in 0..60 {
            gov.record_render(slow);
        }
        assert_eq!(gov.profile().detection_input_size, 128);
    }
}
