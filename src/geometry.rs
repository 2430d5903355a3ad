//! Resolutions and the mapping between capture space and display space.

use std::{cell::Cell, fmt};

use serde::{Deserialize, Serialize};

/// A point in capture or display space.
pub type Point = nalgebra::Point2<f32>;

/// Resolution (`width x height`) of a camera frame or display surface.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns whether this resolution covers zero pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Known capture and display sizes, and the scale factors derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    capture: Resolution,
    display: Resolution,
    scale_x: f32,
    scale_y: f32,
}

impl DisplayGeometry {
    /// Computes the geometry for a camera producing frames of size `capture`, shown on a surface of
    /// size `display`.
    ///
    /// Returns `None` if either resolution is empty, since no meaningful scale exists then.
    pub fn new(capture: Resolution, display: Resolution) -> Option<Self> {
        if capture.is_empty() || display.is_empty() {
            return None;
        }

        Some(Self {
            capture,
            display,
            scale_x: display.width() as f32 / capture.width() as f32,
            scale_y: display.height() as f32 / capture.height() as f32,
        })
    }

    #[inline]
    pub fn capture(&self) -> Resolution {
        self.capture
    }

    #[inline]
    pub fn display(&self) -> Resolution {
        self.display
    }

    #[inline]
    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    #[inline]
    pub fn scale_y(&self) -> f32 {
        self.scale_y
    }

    /// Returns the geometry for rendering the same capture onto a differently sized target.
    pub fn with_display(&self, display: Resolution) -> Option<Self> {
        Self::new(self.capture, display)
    }
}

/// Linear, axis-aligned mapping between capture space and display space.
///
/// Until a [`DisplayGeometry`] is known, the mapper operates in a *degraded* identity mode. This is
/// flagged by [`CoordinateMapper::is_degraded`] rather than being silently treated as correct.
#[derive(Debug, Default)]
pub struct CoordinateMapper {
    geometry: Option<DisplayGeometry>,
    warned: Cell<bool>,
}

impl CoordinateMapper {
    /// Creates a mapper without geometry (in degraded identity mode).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mapper that uses `geometry`.
    pub fn with_geometry(geometry: DisplayGeometry) -> Self {
        Self {
            geometry: Some(geometry),
            warned: Cell::new(false),
        }
    }

    /// Replaces the current geometry (on stream start, resize, or rotation).
    pub fn set_geometry(&mut self, geometry: DisplayGeometry) {
        log::debug!(
            "display geometry: capture {} -> display {} (scale {:.3}x{:.3})",
            geometry.capture(),
            geometry.display(),
            geometry.scale_x(),
            geometry.scale_y(),
        );
        self.geometry = Some(geometry);
        self.warned.set(false);
    }

    pub fn geometry(&self) -> Option<&DisplayGeometry> {
        self.geometry.as_ref()
    }

    /// Returns whether no geometry is known and the mapping is an identity stand-in.
    pub fn is_degraded(&self) -> bool {
        self.geometry.is_none()
    }

    fn scale(&self) -> (f32, f32) {
        match &self.geometry {
            Some(geom) => (geom.scale_x, geom.scale_y),
            None => {
                if !self.warned.replace(true) {
                    log::debug!("mapping coordinates without display geometry; using identity");
                }
                (1.0, 1.0)
            }
        }
    }

    /// Maps a capture-space point to display space.
    pub fn capture_to_display(&self, p: Point) -> Point {
        let (sx, sy) = self.scale();
        Point::new(p.x * sx, p.y * sy)
    }

    /// Maps a display-space point to capture space (the exact inverse of
    /// [`CoordinateMapper::capture_to_display`]).
    pub fn display_to_capture(&self, p: Point) -> Point {
        let (sx, sy) = self.scale();
        Point::new(p.x / sx, p.y / sy)
    }

    /// Maps a horizontal capture-space length to display space.
    pub fn map_width(&self, len: f32) -> f32 {
        len * self.scale().0
    }
}
