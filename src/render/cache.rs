//! Caching of scaled and decorated filter sprites.

use std::{
    collections::{HashMap, VecDeque},
    rc::Rc,
};

use crate::{governor::RenderQuality, image::Image, visual::VisualId};

use super::rasterize;

/// Identifies a rasterized sprite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpriteKey {
    pub visual: VisualId,
    /// Width of the visual in pixels, not counting the decoration margin.
    pub width: u32,
    pub quality: RenderQuality,
}

/// Provides rasterized sprites to the renderer.
///
/// Implementations must return exactly what [`rasterize`] would produce for the same key, so that
/// toggling a cache never changes the rendered output.
pub trait SpriteCache {
    /// Returns the sprite for `key`, rasterizing it from `source` if needed.
    fn sprite(&mut self, key: &SpriteKey, source: &Image) -> Rc<Image>;

    /// Drops all cached sprites.
    fn clear(&mut self);

    /// Returns the number of cached sprites.
    fn len(&self) -> usize;
}

/// A [`SpriteCache`] that caches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl SpriteCache for NoCache {
    fn sprite(&mut self, key: &SpriteKey, source: &Image) -> Rc<Image> {
        Rc::new(rasterize(source, key))
    }

    fn clear(&mut self) {}

    fn len(&self) -> usize {
        0
    }
}

/// A bounded [`SpriteCache`] that evicts the oldest entry when full.
#[derive(Debug)]
pub struct RenderCache {
    capacity: usize,
    sprites: HashMap<SpriteKey, Rc<Image>>,
    /// Insertion order, oldest first.
    order: VecDeque<SpriteKey>,
    hits: u64,
    misses: u64,
}

impl RenderCache {
    /// Creates a cache holding at most `capacity` sprites.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "render cache capacity must be non-zero");
        Self {
            capacity,
            sprites: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the number of lookups that were served from the cache, and the number that were
    /// not.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn contains(&self, key: &SpriteKey) -> bool {
        self.sprites.contains_key(key)
    }
}

impl SpriteCache for RenderCache {
    fn sprite(&mut self, key: &SpriteKey, source: &Image) -> Rc<Image> {
        if let Some(sprite) = self.sprites.get(key) {
            self.hits += 1;
            return sprite.clone();
        }

        self.misses += 1;
        let sprite = Rc::new(rasterize(source, key));
        while self.sprites.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            log::trace!("evicting sprite {:?}", oldest);
            self.sprites.remove(&oldest);
        }
        self.sprites.insert(key.clone(), sprite.clone());
        self.order.push_back(key.clone());
        sprite
    }

    fn clear(&mut self) {
        self.sprites.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.sprites.len()
    }
}
