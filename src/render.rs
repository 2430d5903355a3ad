//! Resolution of anchors into draw instructions, and painting of the overlay surface.
//!
//! Every render tick, [`FilterRenderer::render`] turns the active filters and the currently
//! tracked faces into [`DrawInstruction`]s and paints them onto a transparent surface the size of
//! the display:
//!
//! - With faces tracked, each active filter is drawn once per face, at the face's anchor.
//! - With no face tracked, each active filter is drawn exactly once, at its fallback position.
//!
//! Only the regions painted on the previous tick are cleared before repainting.

mod cache;

use std::collections::{HashMap, HashSet};

use thiserror::Error;

pub use cache::{NoCache, RenderCache, SpriteCache, SpriteKey};

use crate::{
    config::RenderConfig,
    geometry::{CoordinateMapper, DisplayGeometry, Point, Resolution},
    governor::RenderQuality,
    image::{Color, Image, Rect},
    registry::{AnchorKind, FilterConfig, FilterId, FilterRegistry},
    smoothing::TrackedFace,
    visual::{VisualId, VisualStore},
};

/// What a [`DrawInstruction`] is positioned by.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnchorSource {
    /// A face tracked in smoothing slot `slot`.
    Detection { slot: usize },
    /// The filter's fallback position.
    Fallback,
}

/// A single visual to paint, in display space.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawInstruction {
    pub filter: FilterId,
    pub visual: VisualId,
    /// Center of the visual.
    pub center: Point,
    /// Width of the visual.
    pub size: f32,
    /// Opacity in range 0.0 to 1.0.
    pub opacity: f32,
    pub source: AnchorSource,
}

/// Where a filter is drawn while no face is tracked, in display space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPosition {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// Reasons for not drawing (part of) a frame. None of these are fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderSkip {
    #[error("display geometry is not known yet")]
    GeometryNotReady,
    #[error("unknown filter '{0}'")]
    InvalidFilterId(FilterId),
    #[error("visual '{visual}' of filter '{filter}' is missing")]
    MissingVisual { filter: FilterId, visual: VisualId },
}

/// The result of one render tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    /// Instructions that were painted.
    pub instructions: Vec<DrawInstruction>,
    pub skipped: Vec<RenderSkip>,
    /// Bounding box of everything painted this tick.
    pub dirty: Option<Rect>,
}

impl RenderReport {
    fn not_drawn(skip: RenderSkip) -> Self {
        Self {
            skipped: vec![skip],
            ..Self::default()
        }
    }
}

/// Paints filters onto the overlay surface.
pub struct FilterRenderer {
    config: RenderConfig,
    registry: FilterRegistry,
    visuals: VisualStore,
    mapper: CoordinateMapper,
    fallbacks: HashMap<FilterId, FallbackPosition>,
    surface: Image,
    /// Regions painted in the previous tick.
    dirty: Vec<Rect>,
    quality: RenderQuality,
    cache: Box<dyn SpriteCache>,
    cache_enabled: bool,
    warned_ids: HashSet<FilterId>,
}

impl FilterRenderer {
    /// Creates a renderer without display geometry. Nothing is drawn until
    /// [`FilterRenderer::set_geometry`] is called.
    pub fn new(config: RenderConfig, registry: FilterRegistry, visuals: VisualStore) -> Self {
        for (id, filter) in registry.iter() {
            if !visuals.contains(&filter.visual) {
                log::warn!("visual '{}' of filter '{}' is not available", filter.visual, id);
            }
        }

        Self {
            config,
            registry,
            visuals,
            mapper: CoordinateMapper::new(),
            fallbacks: HashMap::new(),
            surface: Image::new(0, 0),
            dirty: Vec::new(),
            quality: RenderQuality::High,
            cache: Box::new(NoCache),
            cache_enabled: false,
            warned_ids: HashSet::new(),
        }
    }

    pub fn geometry(&self) -> Option<&DisplayGeometry> {
        self.mapper.geometry()
    }

    /// Sets the display geometry, recomputes all fallback positions and reallocates the surface if
    /// the display size changed.
    pub fn set_geometry(&mut self, geometry: DisplayGeometry) {
        let display = geometry.display();
        self.mapper.set_geometry(geometry);
        self.fallbacks = self
            .registry
            .iter()
            .map(|(id, filter)| (id.clone(), self.fallback_for(filter, display)))
            .collect();

        if self.surface.resolution() != display {
            self.surface = Image::new(display.width(), display.height());
        } else {
            self.surface.clear(Color::NULL);
        }
        self.dirty.clear();
    }

    /// Returns the fallback position of a filter for the current geometry.
    pub fn fallback(&self, id: &FilterId) -> Option<FallbackPosition> {
        self.fallbacks.get(id).copied()
    }

    pub fn quality(&self) -> RenderQuality {
        self.quality
    }

    pub fn set_quality(&mut self, quality: RenderQuality) {
        if quality != self.quality {
            log::debug!("render quality: {quality}");
            self.quality = quality;
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Switches between the bounded [`RenderCache`] and [`NoCache`].
    pub fn set_cache_enabled(&mut self, enabled: bool) {
        if enabled == self.cache_enabled {
            return;
        }
        log::debug!("render cache {}", if enabled { "on" } else { "off" });
        self.cache_enabled = enabled;
        self.cache = if enabled {
            Box::new(RenderCache::new(self.config.cache_capacity))
        } else {
            Box::new(NoCache)
        };
    }

    /// Returns the overlay surface.
    ///
    /// The surface has the display's resolution and is fully transparent outside of the drawn
    /// filters. Its size is 0x0 until the geometry is known.
    pub fn surface(&self) -> &Image {
        &self.surface
    }

    /// Erases everything drawn on the surface.
    pub fn clear(&mut self) {
        for rect in self.dirty.drain(..) {
            self.surface.clear_rect(rect);
        }
    }

    /// Computes what to draw for `filters` given the tracked `faces`, without drawing anything.
    pub fn resolve(
        &mut self,
        filters: &[FilterId],
        faces: &[TrackedFace],
    ) -> Result<(Vec<DrawInstruction>, Vec<RenderSkip>), RenderSkip> {
        let Some(geometry) = self.mapper.geometry().copied() else {
            return Err(RenderSkip::GeometryNotReady);
        };

        let mut instructions = Vec::new();
        let mut skipped = Vec::new();
        for id in filters {
            let Some(filter) = self.registry.get(id) else {
                if self.warned_ids.insert(id.clone()) {
                    log::warn!("ignoring unknown filter '{id}'");
                }
                skipped.push(RenderSkip::InvalidFilterId(id.clone()));
                continue;
            };
            if !self.visuals.contains(&filter.visual) {
                skipped.push(RenderSkip::MissingVisual {
                    filter: id.clone(),
                    visual: filter.visual.clone(),
                });
                continue;
            }

            if faces.is_empty() {
                let fallback = self
                    .fallbacks
                    .get(id)
                    .copied()
                    .unwrap_or_else(|| self.fallback_for(filter, geometry.display()));
                instructions.push(DrawInstruction {
                    filter: id.clone(),
                    visual: filter.visual.clone(),
                    center: Point::new(fallback.x, fallback.y),
                    size: fallback.size,
                    opacity: 1.0,
                    source: AnchorSource::Fallback,
                });
                continue;
            }

            for face in faces {
                let anchor = match filter.anchor {
                    AnchorKind::Forehead => face.anchor.forehead_center,
                    AnchorKind::Crown => face.anchor.crown_estimate,
                    AnchorKind::Center => face.anchor.face_center,
                };
                let pos = self.mapper.capture_to_display(anchor);
                instructions.push(DrawInstruction {
                    filter: id.clone(),
                    visual: filter.visual.clone(),
                    center: Point::new(pos.x + filter.offset_x, pos.y + filter.offset_y),
                    size: self.size_for(filter, &geometry, face.anchor.face_width),
                    opacity: face.confidence.max(self.config.floor_alpha).min(1.0),
                    source: AnchorSource::Detection { slot: face.slot },
                });
            }
        }

        Ok((instructions, skipped))
    }

    /// Clears the previous frame and paints the current one.
    pub fn render(&mut self, filters: &[FilterId], faces: &[TrackedFace]) -> RenderReport {
        let (instructions, skipped) = match self.resolve(filters, faces) {
            Ok(resolved) => resolved,
            Err(skip) => {
                log::debug!("skipping render: {skip}");
                return RenderReport::not_drawn(skip);
            }
        };

        self.clear();

        let mut dirty: Option<Rect> = None;
        for instr in &instructions {
            let Some(source) = self.visuals.get(&instr.visual) else {
                continue;
            };
            let key = sprite_key(instr, self.quality);
            let sprite = self.cache.sprite(&key, source);
            let rect = paint(&mut self.surface, &sprite, instr);
            if let Some(rect) = rect.intersection(&self.surface.rect()) {
                dirty = Some(dirty.map_or(rect, |d| d.union(&rect)));
                self.dirty.push(rect);
            }
        }
        log::trace!(
            "rendered {} instructions, {} skipped",
            instructions.len(),
            skipped.len()
        );

        RenderReport {
            instructions,
            skipped,
            dirty,
        }
    }

    /// Renders the current anchors once into a new image of size `target`.
    ///
    /// Positions and sizes are scaled from the display to `target`, so the result looks like the
    /// live surface at a higher resolution. Always uses [`RenderQuality::High`]. The live surface
    /// is not modified.
    ///
    /// Returns `None` when the display geometry is not known yet or `target` is empty.
    pub fn render_capture(
        &mut self,
        filters: &[FilterId],
        faces: &[TrackedFace],
        target: Resolution,
    ) -> Option<Image> {
        let geometry = *self.mapper.geometry()?;
        let scaled = geometry.with_display(target)?;
        let (instructions, _) = self.resolve(filters, faces).ok()?;

        let sx = scaled.scale_x() / geometry.scale_x();
        let sy = scaled.scale_y() / geometry.scale_y();
        let mut image = Image::new(target.width(), target.height());
        for mut instr in instructions {
            let Some(source) = self.visuals.get(&instr.visual) else {
                continue;
            };
            instr.center = Point::new(instr.center.x * sx, instr.center.y * sy);
            instr.size *= sx;
            let sprite = rasterize(source, &sprite_key(&instr, RenderQuality::High));
            paint(&mut image, &sprite, &instr);
        }
        log::debug!("captured overlay at {target}");
        Some(image)
    }

    fn fallback_for(&self, filter: &FilterConfig, display: Resolution) -> FallbackPosition {
        FallbackPosition {
            x: filter.fallback.x * display.width() as f32,
            y: filter.fallback.y * display.height() as f32,
            size: filter.base_size * self.display_scale(display),
        }
    }

    fn display_scale(&self, display: Resolution) -> f32 {
        (display.width() as f32 / self.config.reference_width)
            .clamp(self.config.min_scale, self.config.max_scale)
    }

    fn size_for(&self, filter: &FilterConfig, geometry: &DisplayGeometry, face_width: f32) -> f32 {
        if filter.scale_with_subject {
            let rel = self.config.subject_scale_k * face_width / geometry.capture().width() as f32;
            filter.base_size * rel.clamp(self.config.min_scale, self.config.max_scale)
        } else {
            filter.base_size * self.display_scale(geometry.display())
        }
    }
}

fn sprite_key(instr: &DrawInstruction, quality: RenderQuality) -> SpriteKey {
    SpriteKey {
        visual: instr.visual.clone(),
        width: instr.size.round().max(1.0) as u32,
        quality,
    }
}

/// Blends `sprite` onto `target`, centered on the instruction's position. Returns the area
/// covered by the sprite.
fn paint(target: &mut Image, sprite: &Image, instr: &DrawInstruction) -> Rect {
    let rect = Rect::from_center(
        instr.center.x.round() as i32,
        instr.center.y.round() as i32,
        sprite.width(),
        sprite.height(),
    );
    target
        .view_mut(rect)
        .blend_from(sprite)
        .opacity(instr.opacity);
    rect
}

const SHADOW: Color = Color::from_rgba8(0, 0, 0, 110);
const OUTLINE: Color = Color::from_rgba8(255, 255, 255, 200);

/// Scales a visual to the size in `key` and, for [`RenderQuality::High`], decorates it with a drop
/// shadow and an outline.
///
/// High quality sprites carry a transparent margin around the visual so that the decoration is
/// not cut off. The visual stays centered in the sprite.
pub fn rasterize(source: &Image, key: &SpriteKey) -> Image {
    let width = key.width.max(1);
    let height = ((width as f32 * source.height() as f32 / source.width() as f32).round() as u32)
        .max(1);
    let scaled = source.resized(width, height);
    if key.quality == RenderQuality::Low {
        return scaled;
    }

    let margin = (width / 32).max(2);
    let shadow_offset = margin / 2;
    let mut sprite = Image::new(width + margin * 2, height + margin * 2);
    for y in 0..height {
        for x in 0..width {
            let a = scaled.get(x, y).a();
            if a == 0 {
                continue;
            }
            let shadow_alpha = (u32::from(a) * u32::from(SHADOW.a()) / 255) as u8;
            sprite.set(
                x + margin + shadow_offset,
                y + margin + shadow_offset,
                SHADOW.with_alpha(shadow_alpha),
            );
        }
    }
    for y in 0..height {
        for x in 0..width {
            if scaled.get(x, y).a() < 128 {
                continue;
            }
            for (dx, dy) in [(0, 1), (2, 1), (1, 0), (1, 2)] {
                sprite.set(x + margin + dx - 1, y + margin + dy - 1, OUTLINE);
            }
        }
    }
    sprite
        .view_mut(Rect::from_top_left(
            margin as i32,
            margin as i32,
            width,
            height,
        ))
        .blend_from(&scaled);
    sprite
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{
        registry::RelativePosition,
        smoothing::SmoothedAnchor,
    };

    use super::*;

    fn registry() -> FilterRegistry {
        FilterRegistry::new([
            (
                FilterId::new("hat"),
                FilterConfig {
                    visual: VisualId::new("square"),
                    base_size: 40.0,
                    anchor: AnchorKind::Crown,
                    offset_x: 0.0,
                    offset_y: -10.0,
                    scale_with_subject: true,
                    fallback: RelativePosition::new(0.5, 0.25),
                },
            ),
            (
                FilterId::new("band"),
                FilterConfig {
                    visual: VisualId::new("square"),
                    base_size: 20.0,
                    anchor: AnchorKind::Forehead,
                    offset_x: 0.0,
                    offset_y: 0.0,
                    scale_with_subject: false,
                    fallback: RelativePosition::new(0.1, 0.1),
                },
            ),
            (
                FilterId::new("ghost"),
                FilterConfig {
                    visual: VisualId::new("missing"),
                    base_size: 20.0,
                    anchor: AnchorKind::Center,
                    offset_x: 0.0,
                    offset_y: 0.0,
                    scale_with_subject: false,
                    fallback: RelativePosition::new(0.5, 0.5),
                },
            ),
        ])
        .unwrap()
    }

    fn visuals() -> VisualStore {
        let mut square = Image::new(16, 16);
        square.clear(Color::RED);
        let mut store = VisualStore::new();
        store.insert(VisualId::new("square"), square);
        store
    }

    fn renderer(capture: Resolution, display: Resolution) -> FilterRenderer {
        let mut renderer = FilterRenderer::new(RenderConfig::default(), registry(), visuals());
        renderer.set_geometry(DisplayGeometry::new(capture, display).unwrap());
        renderer
    }

    fn face(slot: usize, x: f32, y: f32, width: f32, confidence: f32) -> TrackedFace {
        let p = Point::new(x, y);
        TrackedFace {
            slot,
            anchor: SmoothedAnchor {
                face_center: p,
                forehead_center: p,
                crown_estimate: p,
                face_width: width,
            },
            confidence,
        }
    }

    fn ids(ids: &[&str]) -> Vec<FilterId> {
        ids.iter().copied().map(FilterId::new).collect()
    }

    #[test]
    fn geometry_not_ready() {
        let mut renderer = FilterRenderer::new(RenderConfig::default(), registry(), visuals());
        let report = renderer.render(&ids(&["hat"]), &[]);
        assert_eq!(report.skipped, [RenderSkip::GeometryNotReady]);
        assert!(report.instructions.is_empty());
        assert_eq!(renderer.surface().resolution(), Resolution::new(0, 0));
    }

    #[test]
    fn fallback_positions() {
        let small = renderer(Resolution::new(1280, 720), Resolution::new(640, 360));
        let hat = small.fallback(&"hat".into()).unwrap();
        assert_relative_eq!(hat.x, 320.0);
        assert_relative_eq!(hat.y, 90.0);
        assert_relative_eq!(hat.size, 40.0);

        let large = renderer(Resolution::new(1280, 720), Resolution::new(2560, 1440));
        assert_relative_eq!(large.fallback(&"hat".into()).unwrap().size, 80.0);
    }

    #[test]
    fn no_faces_draws_one_opaque_fallback_per_filter() {
        let mut renderer = renderer(Resolution::new(1280, 720), Resolution::new(640, 360));
        let (instructions, skipped) = renderer.resolve(&ids(&["hat", "band"]), &[]).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(instructions.len(), 2);
        for instr in &instructions {
            assert_eq!(instr.source, AnchorSource::Fallback);
            assert_eq!(instr.opacity, 1.0);
        }
        assert_eq!(instructions[1].center, Point::new(64.0, 36.0));
    }

    #[test]
    fn one_instance_per_face() {
        let mut renderer = renderer(Resolution::new(1280, 720), Resolution::new(640, 360));
        let faces = [
            face(0, 640.0, 360.0, 256.0, 0.95),
            face(1, 200.0, 100.0, 2000.0, 0.1),
        ];
        let (instructions, _) = renderer.resolve(&ids(&["hat"]), &faces).unwrap();
        assert_eq!(instructions.len(), 2);

        let first = &instructions[0];
        assert_eq!(first.source, AnchorSource::Detection { slot: 0 });
        assert_relative_eq!(first.center.x, 320.0);
        assert_relative_eq!(first.center.y, 170.0);
        // 2.5 * 256 / 1280 = 0.5
        assert_relative_eq!(first.size, 20.0);
        assert_relative_eq!(first.opacity, 0.95);

        let second = &instructions[1];
        // clamped to max_scale
        assert_relative_eq!(second.size, 80.0);
        // floor alpha
        assert_relative_eq!(second.opacity, 0.6);
    }

    #[test]
    fn unknown_and_unusable_filters_are_skipped() {
        let mut renderer = renderer(Resolution::new(640, 480), Resolution::new(640, 480));
        let filters = ids(&["nope", "ghost", "band", "nope"]);
        let (instructions, skipped) = renderer.resolve(&filters, &[]).unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(
            skipped,
            [
                RenderSkip::InvalidFilterId("nope".into()),
                RenderSkip::MissingVisual {
                    filter: "ghost".into(),
                    visual: VisualId::new("missing"),
                },
                RenderSkip::InvalidFilterId("nope".into()),
            ]
        );
        assert_eq!(renderer.warned_ids.len(), 1);
    }

    #[test]
    fn clears_previous_frame() {
        let mut renderer = renderer(Resolution::new(200, 200), Resolution::new(200, 200));
        renderer.set_quality(RenderQuality::Low);
        let filters = ids(&["band"]);

        renderer.render(&filters, &[face(0, 50.0, 50.0, 80.0, 1.0)]);
        assert_eq!(renderer.surface().get(50, 50), Color::RED);

        let report = renderer.render(&filters, &[face(0, 150.0, 150.0, 80.0, 1.0)]);
        assert_eq!(renderer.surface().get(50, 50), Color::NULL);
        assert_eq!(renderer.surface().get(150, 150), Color::RED);
        assert!(report.dirty.unwrap().contains(150, 150));

        renderer.clear();
        assert!(renderer.surface().is_transparent());
    }

    #[test]
    fn cache_does_not_change_output() {
        let faces = [face(0, 300.0, 200.0, 300.0, 0.8), face(1, 100.0, 300.0, 150.0, 1.0)];
        let filters = ids(&["hat", "band"]);

        let mut uncached = renderer(Resolution::new(640, 480), Resolution::new(640, 480));
        let mut cached = renderer(Resolution::new(640, 480), Resolution::new(640, 480));
        cached.set_cache_enabled(true);
        for _ in 0..3 {
            uncached.render(&filters, &faces);
            cached.render(&filters, &faces);
        }
        assert_eq!(uncached.surface(), cached.surface());
        assert!(!cached.surface().is_transparent());
    }

    #[test]
    fn capture_scales_the_scene() {
        let mut renderer = renderer(Resolution::new(640, 360), Resolution::new(640, 360));
        let faces = [face(0, 320.0, 180.0, 256.0, 1.0)];
        let filters = ids(&["band"]);
        renderer.render(&filters, &faces);
        let live = renderer.surface().clone();

        let capture = renderer
            .render_capture(&filters, &faces, Resolution::new(1280, 720))
            .unwrap();
        assert_eq!(capture.resolution(), Resolution::new(1280, 720));
        assert_eq!(capture.get(640, 360), Color::RED);
        assert_eq!(renderer.surface(), &live);

        assert!(renderer
            .render_capture(&filters, &faces, Resolution::new(0, 0))
            .is_none());
    }

    #[test]
    fn high_quality_adds_margin() {
        let mut source = Image::new(10, 10);
        source.clear(Color::BLUE);
        let key = SpriteKey {
            visual: VisualId::new("x"),
            width: 64,
            quality: RenderQuality::High,
        };
        let sprite = rasterize(&source, &key);
        assert_eq!(sprite.resolution(), Resolution::new(68, 68));
        assert_eq!(sprite.get(34, 34), Color::BLUE);
        assert_eq!(sprite.get(1, 34), OUTLINE);
        assert_eq!(sprite.get(0, 0), Color::NULL);

        let low = rasterize(
            &source,
            &SpriteKey {
                quality: RenderQuality::Low,
                ..key
            },
        );
        assert_eq!(low.resolution(), Resolution::new(64, 64));
    }
}
