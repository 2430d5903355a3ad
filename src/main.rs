//! Runs the overlay engine for a few seconds against a synthetic camera and detector.
//!
//! Usage: `zaru-overlay [output.png] [filter...]`

use std::{
    env,
    time::{Duration, Instant},
};

use anyhow::Context;
use zaru_overlay::{
    detection::{
        BoundingBox, DetectedFace, DetectionOutcome, FaceDetector, Landmark, LandmarkKind,
        WorkerDriver,
    },
    engine::OverlayEngine,
    geometry::Resolution,
    governor::DeviceCapabilities,
    image::{self, Color, Image},
    registry::FilterId,
    source::{Frame, StillSource},
};

const CAPTURE: Resolution = Resolution::new(1280, 720);
const DISPLAY: Resolution = Resolution::new(640, 360);
const RUN_TIME: Duration = Duration::from_secs(3);

/// Pretends to find a face that moves in a circle, with some per-cycle noise.
struct Orbit {
    cycle: u32,
}

impl FaceDetector for Orbit {
    fn detect(&mut self, frame: &Frame, _input_size: u32) -> DetectionOutcome {
        self.cycle += 1;
        let t = self.cycle as f32 * 0.1;
        let res = frame.resolution();
        let noise = (t * 17.0).sin() * 4.0;
        let xc = res.width() as f32 / 2.0 + t.cos() * 200.0 + noise;
        let yc = res.height() as f32 / 2.0 + t.sin() * 100.0 - noise;
        let (w, h) = (240.0, 300.0);

        let face = DetectedFace::new(BoundingBox::from_center(xc, yc, w, h), 0.9).with_landmarks([
            Landmark::new(LandmarkKind::LeftBrow, xc - w * 0.25, yc - h * 0.2),
            Landmark::new(LandmarkKind::RightBrow, xc + w * 0.25, yc - h * 0.2),
            Landmark::new(LandmarkKind::Nose, xc, yc),
        ]);
        Ok(vec![face])
    }
}

fn main() -> anyhow::Result<()> {
    zaru_overlay::init_logger!();

    let mut args = env::args().skip(1);
    let output = args.next();
    let mut filters: Vec<FilterId> = args.map(FilterId::new).collect();
    if filters.is_empty() {
        filters.push("party-hat".into());
    }

    let mut engine = OverlayEngine::builder()
        .detector(WorkerDriver::spawn(Orbit { cycle: 0 })?)
        .capabilities(DeviceCapabilities {
            memory_gb: Some(8.0),
            logical_cores: Some(8),
            ..DeviceCapabilities::default()
        })
        .build()?;

    let mut camera = Image::new(CAPTURE.width(), CAPTURE.height());
    camera.clear(Color::from_rgb8(40, 40, 60));
    image::draw_ellipse(
        &mut camera,
        image::Rect::from_center(640, 360, 240, 300),
    )
    .fill(Color::from_rgb8(220, 180, 150));
    let mut source = StillSource::new(camera.clone());

    let epoch = Instant::now();
    engine.on_geometry_change(CAPTURE, DISPLAY, epoch.elapsed());
    engine.set_filters(filters);
    engine.start(epoch.elapsed());

    let mut renders = 0;
    while epoch.elapsed() < RUN_TIME {
        let report = engine.poll(epoch.elapsed(), &mut source);
        if report.render.is_some() {
            renders += 1;
        }
        if let Some(deadline) = engine.scheduler().next_deadline() {
            if let Some(wait) = deadline.checked_sub(epoch.elapsed()) {
                std::thread::sleep(wait);
            }
        }
    }

    log::info!(
        "{} render ticks, {} faces tracked, profile: {:?}",
        renders,
        engine.tracked_faces().len(),
        engine.profile()
    );

    if let Some(path) = output {
        let overlay = engine
            .capture(CAPTURE)
            .context("overlay geometry was never established")?;
        camera.blend_from(&overlay);
        camera
            .save(&path)
            .with_context(|| format!("failed to save {path}"))?;
        log::info!("saved composited frame to {path}");
    }

    engine.stop();
    Ok(())
}
