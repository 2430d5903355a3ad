//! The static table of available filters.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, visual::VisualId};

/// Identifies a filter in a [`FilterRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterId(String);

impl FilterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// The face anchor a filter is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// Between the eyebrows.
    Forehead,
    /// The (extrapolated) top of the head.
    Crown,
    /// The center of the face's bounding box.
    Center,
}

/// A position relative to the display surface, with both coordinates in range 0.0 to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativePosition {
    pub x: f32,
    pub y: f32,
}

impl RelativePosition {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Describes where and how large a filter's visual is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub visual: VisualId,
    /// Width of the visual in display pixels, before scaling.
    pub base_size: f32,
    pub anchor: AnchorKind,
    /// Horizontal displacement from the anchor, in display pixels.
    #[serde(default)]
    pub offset_x: f32,
    /// Vertical displacement from the anchor, in display pixels.
    #[serde(default)]
    pub offset_y: f32,
    /// Whether the visual is sized relative to the face it is attached to, or only to the display.
    #[serde(default)]
    pub scale_with_subject: bool,
    /// Where the visual is shown while no face is tracked.
    pub fallback: RelativePosition,
}

impl FilterConfig {
    fn validate(&self, id: &FilterId) -> Result<(), ConfigError> {
        if !(self.base_size > 0.0 && self.base_size.is_finite()) {
            return Err(ConfigError::InvalidBaseSize {
                id: id.clone(),
                size: self.base_size,
            });
        }

        let RelativePosition { x, y } = self.fallback;
        if !((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)) {
            return Err(ConfigError::InvalidFallback { id: id.clone(), x, y });
        }

        if !(self.offset_x.is_finite() && self.offset_y.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "offset",
                reason: format!("offset of filter `{id}` must be finite"),
            });
        }

        Ok(())
    }
}

#[derive(Deserialize)]
struct RegistryEntry {
    id: FilterId,
    #[serde(flatten)]
    config: FilterConfig,
}

/// Immutable mapping from [`FilterId`] to [`FilterConfig`].
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    filters: HashMap<FilterId, FilterConfig>,
}

impl FilterRegistry {
    /// Creates a registry from a list of filters.
    ///
    /// Fails if any configuration is invalid or an id occurs more than once.
    pub fn new<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (FilterId, FilterConfig)>,
    {
        let mut filters = HashMap::new();
        for (id, config) in entries {
            config.validate(&id)?;
            if filters.contains_key(&id) {
                return Err(ConfigError::DuplicateFilter(id));
            }
            filters.insert(id, config);
        }
        Ok(Self { filters })
    }

    /// Parses a registry from a JSON array of filter objects.
    ///
    /// Each object carries an `id` next to the fields of [`FilterConfig`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let entries: Vec<RegistryEntry> = serde_json::from_str(json)?;
        Self::new(entries.into_iter().map(|e| (e.id, e.config)))
    }

    /// Returns the registry of the filters that ship with the crate.
    ///
    /// Their visuals are provided by [`VisualStore::builtin`][crate::visual::VisualStore::builtin].
    pub fn builtin() -> Self {
        let entries = [
            (
                "party-hat",
                FilterConfig {
                    visual: VisualId::new("party_hat"),
                    base_size: 120.0,
                    anchor: AnchorKind::Crown,
                    offset_x: 0.0,
                    offset_y: -20.0,
                    scale_with_subject: true,
                    fallback: RelativePosition::new(0.5, 0.15),
                },
            ),
            (
                "halo",
                FilterConfig {
                    visual: VisualId::new("halo"),
                    base_size: 140.0,
                    anchor: AnchorKind::Crown,
                    offset_x: 0.0,
                    offset_y: -10.0,
                    scale_with_subject: true,
                    fallback: RelativePosition::new(0.5, 0.1),
                },
            ),
            (
                "sunglasses",
                FilterConfig {
                    visual: VisualId::new("sunglasses"),
                    base_size: 110.0,
                    anchor: AnchorKind::Center,
                    offset_x: 0.0,
                    offset_y: -12.0,
                    scale_with_subject: true,
                    fallback: RelativePosition::new(0.5, 0.4),
                },
            ),
            (
                "headband",
                FilterConfig {
                    visual: VisualId::new("headband"),
                    base_size: 130.0,
                    anchor: AnchorKind::Forehead,
                    offset_x: 0.0,
                    offset_y: 0.0,
                    scale_with_subject: false,
                    fallback: RelativePosition::new(0.5, 0.25),
                },
            ),
        ];

        let filters = entries
            .into_iter()
            .map(|(id, config)| (FilterId::new(id), config))
            .collect();
        Self { filters }
    }

    pub fn get(&self, id: &FilterId) -> Option<&FilterConfig> {
        self.filters.get(id)
    }

    pub fn contains(&self, id: &FilterId) -> bool {
        self.filters.contains_key(id)
    }

    /// Returns an iterator over all registered filters, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&FilterId, &FilterConfig)> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FilterConfig {
        FilterConfig {
            visual: VisualId::new("v"),
            base_size: 100.0,
            anchor: AnchorKind::Center,
            offset_x: 0.0,
            offset_y: 0.0,
            scale_with_subject: false,
            fallback: RelativePosition::new(0.5, 0.5),
        }
    }

    #[test]
    fn builtin_is_valid() {
        let builtin = FilterRegistry::builtin();
        assert!(!builtin.is_empty());
        for (id, config) in builtin.iter() {
            config.validate(id).unwrap();
        }
    }

    #[test]
    fn rejects_duplicates() {
        let err = FilterRegistry::new([("a".into(), config()), ("a".into(), config())]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateFilter(id) if id.as_str() == "a"));
    }

    #[test]
    fn rejects_out_of_range_fallback() {
        let mut bad = config();
        bad.fallback = RelativePosition::new(1.5, 0.0);
        assert!(matches!(
            FilterRegistry::new([("a".into(), bad)]),
            Err(ConfigError::InvalidFallback { .. })
        ));

        let mut bad = config();
        bad.base_size = 0.0;
        assert!(matches!(
            FilterRegistry::new([("a".into(), bad)]),
            Err(ConfigError::InvalidBaseSize { .. })
        ));
    }

    #[test]
    fn parses_json() {
        let registry = FilterRegistry::from_json(
            r#"[
                {
                    "id": "crown",
                    "visual": "crown",
                    "base_size": 90,
                    "anchor": "crown",
                    "offset_y": -5,
                    "scale_with_subject": true,
                    "fallback": { "x": 0.5, "y": 0.2 }
                }
            ]"#,
        )
        .unwrap();
        let config = registry.get(&"crown".into()).unwrap();
        assert_eq!(config.anchor, AnchorKind::Crown);
        assert_eq!(config.offset_x, 0.0);
        assert_eq!(config.offset_y, -5.0);
        assert!(config.scale_with_subject);

        assert!(matches!(
            FilterRegistry::from_json("[{\"id\": 1}]"),
            Err(ConfigError::Parse(_))
        ));
    }
}
