//! Filter artwork.
//!
//! A [`VisualStore`] holds the source images that filters are drawn with. The renderer scales them
//! to the required size on demand, so they should be provided at a generous resolution.

use std::{collections::HashMap, fmt};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::image::{
    draw_circle, draw_ellipse, draw_line, draw_rect, draw_rounded_rect, draw_triangle, Color,
    Image, Rect,
};

/// Identifies a visual in a [`VisualStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualId(String);

impl VisualId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisualId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps [`VisualId`]s to their source images.
#[derive(Debug, Clone, Default)]
pub struct VisualStore {
    visuals: HashMap<VisualId, Image>,
}

impl VisualStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a visual.
    ///
    /// Empty images are ignored, since nothing could be drawn with them.
    pub fn insert(&mut self, id: VisualId, image: Image) {
        if image.width() == 0 || image.height() == 0 {
            log::warn!("ignoring empty visual '{id}'");
            return;
        }
        self.visuals.insert(id, image);
    }

    pub fn get(&self, id: &VisualId) -> Option<&Image> {
        self.visuals.get(id)
    }

    pub fn contains(&self, id: &VisualId) -> bool {
        self.visuals.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    /// Returns a store containing the visuals used by
    /// [`FilterRegistry::builtin`][crate::registry::FilterRegistry::builtin].
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }
}

static BUILTIN: Lazy<VisualStore> = Lazy::new(|| {
    let mut store = VisualStore::new();
    store.insert(VisualId::new("party_hat"), party_hat());
    store.insert(VisualId::new("halo"), halo());
    store.insert(VisualId::new("sunglasses"), sunglasses());
    store.insert(VisualId::new("headband"), headband());
    store
});

fn party_hat() -> Image {
    let mut image = Image::new(200, 240);
    draw_triangle(&mut image, (100, 20), (12, 228), (188, 228)).fill(Color::from_rgb8(214, 40, 160));
    for i in 1..4 {
        let y = 20 + i * 52;
        let half = (y - 20) * 88 / 208;
        draw_line(&mut image, (100 - half, y), (100 + half, y))
            .stroke(Color::YELLOW)
            .stroke_width(6);
    }
    draw_rounded_rect(&mut image, Rect::from_top_left(4, 222, 192, 16), 8)
        .fill(Color::from_rgb8(255, 220, 60));
    draw_circle(&mut image, 100, 20, 36).fill(Color::WHITE);
    image
}

fn halo() -> Image {
    let mut image = Image::new(240, 80);
    draw_ellipse(&mut image, Rect::from_top_left(6, 6, 228, 68))
        .no_fill()
        .stroke(Color::from_rgb8(255, 214, 64))
        .stroke_width(12);
    draw_ellipse(&mut image, Rect::from_top_left(14, 14, 212, 52))
        .no_fill()
        .stroke(Color::from_rgba8(255, 250, 200, 160))
        .stroke_width(2);
    image
}

fn sunglasses() -> Image {
    let mut image = Image::new(240, 90);
    let lens = Color::from_rgba8(20, 20, 30, 235);
    let frame = Color::from_rgb8(10, 10, 10);
    for x in [8, 132] {
        draw_rounded_rect(&mut image, Rect::from_top_left(x, 14, 100, 68), 22)
            .fill(lens)
            .stroke(frame)
            .stroke_width(6);
    }
    draw_line(&mut image, (108, 34), (132, 34))
        .stroke(frame)
        .stroke_width(8);
    draw_line(&mut image, (0, 26), (8, 30)).stroke(frame).stroke_width(6);
    draw_line(&mut image, (232, 30), (240, 26)).stroke(frame).stroke_width(6);
    draw_line(&mut image, (30, 26), (56, 26))
        .stroke(Color::from_rgba8(255, 255, 255, 120))
        .stroke_width(4);
    image
}

fn headband() -> Image {
    let mut image = Image::new(260, 60);
    draw_rounded_rect(&mut image, Rect::from_top_left(0, 10, 260, 40), 18)
        .fill(Color::from_rgb8(220, 30, 40));
    draw_rect(&mut image, Rect::from_top_left(10, 26, 240, 8)).fill(Color::WHITE);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_visuals_are_drawn() {
        let store = VisualStore::builtin();
        assert_eq!(store.len(), 4);
        for id in ["party_hat", "halo", "sunglasses", "headband"] {
            let image = store.get(&VisualId::new(id)).unwrap();
            assert!(!image.is_transparent(), "visual {id} is empty");
        }

        // The halo is a ring, its center stays see-through.
        let halo = store.get(&VisualId::new("halo")).unwrap();
        assert_eq!(halo.get(120, 40), Color::NULL);
    }

    #[test]
    fn ignores_empty_images() {
        let mut store = VisualStore::new();
        store.insert(VisualId::new("nothing"), Image::new(0, 10));
        assert!(store.is_empty());
    }
}
