//! The host-facing composition of all components.
//!
//! ```
//! use std::time::Duration;
//! use zaru_overlay::{
//!     engine::OverlayEngine, geometry::Resolution, image::Image, source::StillSource,
//! };
//!
//! let mut engine = OverlayEngine::builder().build().unwrap();
//! let mut source = StillSource::new(Image::new(640, 480));
//! engine.on_geometry_change(Resolution::new(640, 480), Resolution::new(320, 240), Duration::ZERO);
//! engine.set_filter(Some("party-hat".into()));
//! engine.start(Duration::ZERO);
//! engine.poll(Duration::ZERO, &mut source);
//!
//! // No detector is configured, so the hat is drawn at its fallback position.
//! assert!(!engine.surface().is_transparent());
//! ```

use std::time::Duration;

use crate::{
    config::EngineConfig,
    detection::{sanitize, DetectionDriver, DetectionOutcome},
    error::{ConfigError, DetectionError},
    geometry::{DisplayGeometry, Resolution},
    governor::{CycleOutcome, DeviceCapabilities, PerformanceGovernor, PerformanceProfile},
    image::Image,
    registry::{FilterId, FilterRegistry},
    render::{FilterRenderer, RenderReport},
    scheduler::{CancellationToken, OverlayScheduler, Tick},
    smoothing::{PositionSmoother, TrackedFace},
    source::FrameSource,
    timer::{FpsCounter, Timer},
    visual::VisualStore,
};

/// Builder for [`OverlayEngine`]s.
///
/// Defaults to [`EngineConfig::default`], the built-in filters and visuals, no face detector and
/// unknown device capabilities.
pub struct OverlayEngineBuilder {
    config: EngineConfig,
    registry: Option<FilterRegistry>,
    visuals: Option<VisualStore>,
    detector: Option<Box<dyn DetectionDriver>>,
    capabilities: DeviceCapabilities,
}

impl OverlayEngineBuilder {
    pub fn config(self, config: EngineConfig) -> Self {
        Self { config, ..self }
    }

    pub fn registry(self, registry: FilterRegistry) -> Self {
        Self {
            registry: Some(registry),
            ..self
        }
    }

    pub fn visuals(self, visuals: VisualStore) -> Self {
        Self {
            visuals: Some(visuals),
            ..self
        }
    }

    /// Sets the face detector. Without one, filters are only ever drawn at their fallback
    /// positions.
    pub fn detector<D: DetectionDriver + 'static>(self, detector: D) -> Self {
        Self {
            detector: Some(Box::new(detector)),
            ..self
        }
    }

    /// Sets the result of the host's device capability probe.
    pub fn capabilities(self, capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            ..self
        }
    }

    /// Validates the configuration and creates the (idle) engine.
    pub fn build(self) -> Result<OverlayEngine, ConfigError> {
        self.config.validate()?;

        let smoother = PositionSmoother::new(self.config.smoothing.alpha)?;
        let mut governor = PerformanceGovernor::new(&self.capabilities, self.config.governor.clone());
        if self.detector.is_none() {
            log::info!("no face detector configured");
            governor.record_detection(CycleOutcome::Unavailable);
        }

        let scheduler =
            OverlayScheduler::new(self.config.render_interval(), governor.detection_interval());
        let mut renderer = FilterRenderer::new(
            self.config.render.clone(),
            self.registry.unwrap_or_else(FilterRegistry::builtin),
            self.visuals.unwrap_or_else(VisualStore::builtin),
        );
        renderer.set_quality(governor.profile().render_quality);
        renderer.set_cache_enabled(governor.profile().cache_enabled);

        Ok(OverlayEngine {
            config: self.config,
            scheduler,
            governor,
            smoother,
            renderer,
            detector: self.detector,
            in_flight: None,
            active_filters: Vec::new(),
            capture: None,
            display: None,
            render_timer: Timer::new("render"),
            fps: FpsCounter::new("overlay"),
        })
    }
}

/// What happened during one [`OverlayEngine::poll`].
#[derive(Debug, Default)]
pub struct PollReport {
    /// The ticks that were due.
    pub ticks: Vec<Tick>,
    /// Whether a new detection cycle was started.
    pub detection_submitted: bool,
    /// Outcome of the detection cycle that completed during this poll, if any.
    pub detection: Option<CycleOutcome>,
    /// Result of the render tick, if one was due.
    pub render: Option<RenderReport>,
}

/// Face-anchored overlay engine.
///
/// The host owns the engine, feeds it geometry changes and filter selections, and drives it by
/// calling [`OverlayEngine::poll`] regularly (for example once per display refresh). Everything
/// runs on the caller's thread; only a [`WorkerDriver`][crate::detection::WorkerDriver] detector
/// uses a thread of its own.
pub struct OverlayEngine {
    config: EngineConfig,
    scheduler: OverlayScheduler,
    governor: PerformanceGovernor,
    smoother: PositionSmoother,
    renderer: FilterRenderer,
    detector: Option<Box<dyn DetectionDriver>>,
    /// Activation the running detection cycle was started under.
    in_flight: Option<CancellationToken>,
    active_filters: Vec<FilterId>,
    capture: Option<Resolution>,
    display: Option<Resolution>,
    render_timer: Timer,
    fps: FpsCounter,
}

impl OverlayEngine {
    pub fn builder() -> OverlayEngineBuilder {
        OverlayEngineBuilder {
            config: EngineConfig::default(),
            registry: None,
            visuals: None,
            detector: None,
            capabilities: DeviceCapabilities::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts (or restarts) detection and rendering.
    ///
    /// Also re-enables detection if the governor turned it off after too many empty cycles.
    pub fn start(&mut self, now: Duration) {
        self.governor.restart();
        self.scheduler
            .set_detection_interval(self.governor.detection_interval(), now);
        self.scheduler.start(now);
        log::info!(
            "overlay started ({} active filters)",
            self.active_filters.len()
        );
    }

    /// Stops detection and rendering, erases the overlay and forgets all tracked faces.
    ///
    /// A detection cycle that is still running is discarded when it completes.
    pub fn stop(&mut self) {
        if !self.scheduler.is_active() {
            return;
        }
        self.scheduler.stop();
        self.renderer.clear();
        self.smoother.reset();
        log::info!("overlay stopped");
    }

    pub fn is_active(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Selects a single filter, or none.
    pub fn set_filter(&mut self, filter: Option<FilterId>) {
        self.set_filters(filter.into_iter().collect());
    }

    /// Selects the filters to draw, in drawing order.
    ///
    /// The overlay is erased immediately. Unknown ids are ignored (with a warning) when rendering.
    pub fn set_filters(&mut self, filters: Vec<FilterId>) {
        log::debug!("active filters: {:?}", filters);
        self.active_filters = filters;
        self.renderer.clear();
    }

    pub fn active_filters(&self) -> &[FilterId] {
        &self.active_filters
    }

    /// Informs the engine about new capture or display sizes.
    ///
    /// Recomputes the display geometry and all fallback positions, reallocates the overlay
    /// surface, and restarts the scheduler if it is running.
    ///
    /// A change of the capture resolution (e.g. after rotating the device) also drops all tracked
    /// faces, since their anchors are in the old capture space.
    pub fn on_geometry_change(&mut self, capture: Resolution, display: Resolution, now: Duration) {
        self.apply_geometry(capture, display);
        if self.scheduler.is_active() {
            self.scheduler.restart(now);
        }
    }

    fn apply_geometry(&mut self, capture: Resolution, display: Resolution) {
        if self.capture.map_or(false, |old| old != capture) {
            // Anchors are in capture space and would be misplaced.
            self.smoother.reset();
        }
        self.capture = Some(capture);
        self.display = Some(display);

        match DisplayGeometry::new(capture, display) {
            Some(geometry) => self.renderer.set_geometry(geometry),
            None => log::warn!("ignoring empty geometry: capture {capture}, display {display}"),
        }
    }

    pub fn geometry(&self) -> Option<&DisplayGeometry> {
        self.renderer.geometry()
    }

    pub fn profile(&self) -> &PerformanceProfile {
        self.governor.profile()
    }

    pub fn governor(&self) -> &PerformanceGovernor {
        &self.governor
    }

    pub fn scheduler(&self) -> &OverlayScheduler {
        &self.scheduler
    }

    pub fn renderer(&self) -> &FilterRenderer {
        &self.renderer
    }

    /// Returns the faces observed in the latest detection cycle.
    pub fn tracked_faces(&self) -> Vec<TrackedFace> {
        self.smoother.tracked()
    }

    /// Returns the overlay surface, at display resolution.
    pub fn surface(&self) -> &Image {
        self.renderer.surface()
    }

    /// Renders the current overlay into a new image of size `target`, e.g. for a still photo
    /// taken at the camera's full resolution.
    pub fn capture(&mut self, target: Resolution) -> Option<Image> {
        let faces = self.smoother.tracked();
        self.renderer
            .render_capture(&self.active_filters, &faces, target)
    }

    /// Runs all work that is due at `now`.
    pub fn poll(&mut self, now: Duration, source: &mut dyn FrameSource) -> PollReport {
        let mut report = PollReport {
            detection: self.collect_detection(now),
            ..PollReport::default()
        };

        report.ticks = self.scheduler.poll(now);
        for tick in report.ticks.clone() {
            match tick {
                Tick::Detect => {
                    report.detection_submitted = self.submit_detection(source);
                    if let Some(outcome) = self.collect_detection(now) {
                        report.detection = Some(outcome);
                    }
                }
                Tick::Render => report.render = Some(self.render(now)),
            }
        }
        report
    }

    fn submit_detection(&mut self, source: &mut dyn FrameSource) -> bool {
        let Some(token) = self.scheduler.token() else {
            return false;
        };
        if self.detector.is_none() {
            return false;
        }
        if self.in_flight.is_some() {
            log::trace!("previous detection still running, skipping cycle");
            return false;
        }

        let resolution = source.resolution();
        if !resolution.is_empty() && self.capture != Some(resolution) {
            log::debug!("capture resolution changed to {resolution}");
            match self.display {
                Some(display) => self.apply_geometry(resolution, display),
                None => self.capture = Some(resolution),
            }
        }

        let Some(frame) = source.frame() else {
            log::trace!("no frame available");
            return false;
        };
        let input_size = self.governor.profile().detection_input_size;
        let Some(detector) = self.detector.as_mut() else {
            return false;
        };
        detector.submit(frame, input_size);
        self.in_flight = Some(token);
        true
    }

    fn collect_detection(&mut self, now: Duration) -> Option<CycleOutcome> {
        let token = self.in_flight?;
        let outcome = self.detector.as_mut()?.poll()?;
        self.in_flight = None;

        if !self.scheduler.is_current(token) {
            log::debug!("discarding result of cancelled detection cycle");
            return None;
        }
        Some(self.apply_detection(outcome, now))
    }

    fn apply_detection(&mut self, outcome: DetectionOutcome, now: Duration) -> CycleOutcome {
        let (faces, cycle) = match outcome {
            Ok(faces) => {
                let faces = sanitize(faces);
                let cycle = match faces.len() {
                    0 => CycleOutcome::Empty,
                    n => CycleOutcome::Faces(n),
                };
                (faces, cycle)
            }
            Err(DetectionError::Failed(reason)) => {
                log::debug!("detection failed: {reason}");
                (Vec::new(), CycleOutcome::Failed)
            }
            Err(DetectionError::Unavailable) => (Vec::new(), CycleOutcome::Unavailable),
        };
        log::trace!("detection cycle: {:?}", cycle);

        self.smoother.update(&faces);
        self.governor.record_detection(cycle);
        self.sync_profile(now);
        cycle
    }

    fn render(&mut self, now: Duration) -> RenderReport {
        if self.active_filters.is_empty() {
            self.renderer.clear();
            return RenderReport::default();
        }

        let faces = self.smoother.tracked();
        let (report, cost) = self
            .render_timer
            .time(|| self.renderer.render(&self.active_filters, &faces));
        if !report.instructions.is_empty() {
            self.governor.record_render(cost);
            self.sync_profile(now);
        }
        self.fps.tick_with([&self.render_timer]);
        report
    }

    /// Applies the governor's current profile to the scheduler and renderer.
    fn sync_profile(&mut self, now: Duration) {
        let profile = *self.governor.profile();
        self.scheduler
            .set_detection_interval(self.governor.detection_interval(), now);
        self.renderer.set_quality(profile.render_quality);
        self.renderer.set_cache_enabled(profile.cache_enabled);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use crate::{
        detection::{BoundingBox, DetectedFace},
        render::AnchorSource,
        source::{Frame, StillSource},
    };

    use super::*;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    /// Completes a submitted cycle only once `ready` is set.
    struct Gated {
        ready: Rc<Cell<bool>>,
        submitted: u32,
    }

    impl DetectionDriver for Gated {
        fn submit(&mut self, _: Frame, _: u32) {
            self.submitted += 1;
        }

        fn poll(&mut self) -> Option<DetectionOutcome> {
            if !self.ready.replace(false) {
                return None;
            }
            Some(Ok(vec![DetectedFace::new(
                BoundingBox::new(100.0, 100.0, 80.0, 100.0),
                0.9,
            )]))
        }
    }

    fn source() -> StillSource {
        StillSource::new(Image::new(640, 480))
    }

    fn engine(builder: OverlayEngineBuilder) -> OverlayEngine {
        let mut engine = builder.build().unwrap();
        engine.on_geometry_change(Resolution::new(640, 480), Resolution::new(640, 480), ms(0));
        engine.set_filter(Some("halo".into()));
        engine
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.smoothing.alpha = 1.0;
        assert!(matches!(
            OverlayEngine::builder().config(config).build(),
            Err(ConfigError::InvalidAlpha(_))
        ));
    }

    #[test]
    fn without_detector_only_renders() {
        let mut engine = engine(OverlayEngine::builder());
        assert!(!engine.profile().detection_enabled);
        engine.start(ms(0));

        let report = engine.poll(ms(0), &mut source());
        assert_eq!(report.ticks, [Tick::Render]);
        assert!(!report.detection_submitted);
        let render = report.render.unwrap();
        assert_eq!(render.instructions.len(), 1);
        assert_eq!(render.instructions[0].source, AnchorSource::Fallback);
    }

    #[test]
    fn idle_engine_does_nothing() {
        let mut engine = engine(OverlayEngine::builder());
        let report = engine.poll(ms(0), &mut source());
        assert!(report.ticks.is_empty());
        assert!(engine.surface().is_transparent());
    }

    #[test]
    fn completion_of_cancelled_cycle_is_discarded() {
        let ready = Rc::new(Cell::new(false));
        let mut engine = engine(OverlayEngine::builder().detector(Gated {
            ready: ready.clone(),
            submitted: 0,
        }));
        engine.start(ms(0));
        let report = engine.poll(ms(0), &mut source());
        assert!(report.detection_submitted);
        assert_eq!(report.detection, None);

        // Still in flight: the next detection tick is skipped.
        let report = engine.poll(ms(50), &mut source());
        assert!(report.ticks.contains(&Tick::Detect));
        assert!(!report.detection_submitted);

        engine.stop();
        engine.start(ms(60));
        ready.set(true);
        let report = engine.poll(ms(60), &mut source());
        assert_eq!(report.detection, None);
        assert!(engine.tracked_faces().is_empty());
        // The stale cycle no longer blocks new ones.
        assert!(report.detection_submitted);

        ready.set(true);
        let report = engine.poll(ms(61), &mut source());
        assert_eq!(report.detection, Some(CycleOutcome::Faces(1)));
        assert_eq!(engine.tracked_faces().len(), 1);
    }

    #[test]
    fn stop_erases_the_overlay() {
        let mut engine = engine(OverlayEngine::builder());
        engine.start(ms(0));
        engine.poll(ms(0), &mut source());
        assert!(!engine.surface().is_transparent());

        engine.stop();
        assert!(!engine.is_active());
        assert!(engine.surface().is_transparent());
        assert!(engine.poll(ms(100), &mut source()).ticks.is_empty());
    }

    #[test]
    fn source_resolution_change_updates_geometry() {
        let mut engine = engine(OverlayEngine::builder().detector(Gated {
            ready: Rc::new(Cell::new(false)),
            submitted: 0,
        }));
        engine.start(ms(0));
        let mut rotated = StillSource::new(Image::new(480, 640));
        engine.poll(ms(0), &mut rotated);
        assert_eq!(
            engine.geometry().unwrap().capture(),
            Resolution::new(480, 640)
        );
    }
}
