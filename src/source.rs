//! Video frame sources.
//!
//! Camera acquisition itself lives in the host. The engine only needs to know the native size of
//! the frames and to obtain a handle to the current frame, which it forwards to the face detector.

use std::sync::Arc;

use crate::{geometry::Resolution, image::Image};

/// A cheaply cloneable handle to a captured video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<Image>,
}

impl Frame {
    pub fn new(image: Image) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Returns the native (capture space) size of the frame.
    pub fn resolution(&self) -> Resolution {
        self.image.resolution()
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl From<Image> for Frame {
    fn from(image: Image) -> Self {
        Self::new(image)
    }
}

/// Supplies the current video frame.
pub trait FrameSource {
    /// Returns the native size of the frames this source produces.
    ///
    /// The engine compares this against its display geometry on every detection tick and
    /// recomputes the geometry when it changes (for example after the device was rotated).
    fn resolution(&self) -> Resolution;

    /// Returns the most recent frame, or `None` if no frame is available yet.
    fn frame(&mut self) -> Option<Frame>;
}

/// A [`FrameSource`] that always returns the same frame.
///
/// Useful for compositing onto a still photo.
#[derive(Debug, Clone)]
pub struct StillSource {
    frame: Frame,
}

impl StillSource {
    pub fn new(frame: impl Into<Frame>) -> Self {
        Self {
            frame: frame.into(),
        }
    }
}

impl FrameSource for StillSource {
    fn resolution(&self) -> Resolution {
        self.frame.resolution()
    }

    fn frame(&mut self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}
