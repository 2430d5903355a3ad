//! Face-anchored overlay rendering.
//!
//! This crate draws graphical filters (hats, halos, glasses, ...) on top of a live video stream,
//! anchored to the faces a [`FaceDetector`] finds in it. It takes care of:
//!
//! - stabilizing the detected positions against detector noise ([`smoothing`]),
//! - mapping them from the camera's resolution to the display's ([`geometry`]),
//! - choosing detection cadence and render quality for the device it runs on ([`governor`]),
//! - painting the filters onto a transparent overlay surface ([`render`]),
//! - and interleaving detection and rendering on a single thread ([`scheduler`]).
//!
//! [`engine::OverlayEngine`] ties all of these together. The host owns the engine and calls into
//! it: it feeds it geometry changes, drives it with [`OverlayEngine::poll`] and composites the
//! surface returned by [`OverlayEngine::surface`] over its camera preview.
//!
//! # Coordinates
//!
//! All 2D coordinates use the image convention: the origin is the top left corner, X points to
//! the right and Y points *down*. *Capture space* uses the units of the raw camera frame,
//! *display space* the units of the overlay surface.
//!
//! [`FaceDetector`]: detection::FaceDetector
//! [`OverlayEngine::poll`]: engine::OverlayEngine::poll
//! [`OverlayEngine::surface`]: engine::OverlayEngine::surface

use log::LevelFilter;

pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod governor;
pub mod image;
pub mod registry;
pub mod render;
pub mod scheduler;
pub mod smoothing;
pub mod source;
pub mod timer;
pub mod visual;
pub mod worker;

mod drop;

pub use error::{ConfigError, DetectionError, ParseError};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this crate will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` can override both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
