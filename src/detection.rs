//! Face detection results and the detector capability contract.
//!
//! The engine does not ship a detector. Hosts implement [`FaceDetector`] (typically on top of a
//! neural network) and hand it to the engine wrapped in a [`DetectionDriver`]:
//!
//! - [`InlineDriver`] runs the detector synchronously on the engine thread.
//! - [`WorkerDriver`] runs it on a background thread, so a slow detector never stalls rendering.

use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
};

use crate::{
    error::DetectionError,
    geometry::Point,
    source::Frame,
    worker::{promise, Promise, PromiseHandle, Worker},
};

/// Axis-aligned face bounding box in capture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// X coordinate of the left edge.
    pub x: f32,
    /// Y coordinate of the top edge.
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Creates a bounding box of size `w x h` centered on `(xc, yc)`.
    pub fn from_center(xc: f32, yc: f32, w: f32, h: f32) -> Self {
        Self {
            x: xc - w / 2.0,
            y: yc - h / 2.0,
            w,
            h,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.w.is_finite() && self.h.is_finite()
    }
}

/// The facial feature a [`Landmark`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkKind {
    LeftBrow,
    RightBrow,
    LeftEye,
    RightEye,
    Nose,
    Mouth,
    Other,
}

impl LandmarkKind {
    pub fn is_brow(self) -> bool {
        matches!(self, Self::LeftBrow | Self::RightBrow)
    }
}

/// A facial keypoint in capture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub kind: LandmarkKind,
    pub pos: Point,
}

impl Landmark {
    pub fn new(kind: LandmarkKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            pos: Point::new(x, y),
        }
    }
}

/// A face found by a [`FaceDetector`].
///
/// The whole set of detections is replaced every cycle. The position of a face in the detector's
/// output is the only thing that relates it to faces from earlier cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub landmarks: Vec<Landmark>,
    /// Detection confidence in range 0.0 to 1.0.
    pub confidence: f32,
}

impl DetectedFace {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            landmarks: Vec::new(),
            confidence,
        }
    }

    pub fn with_landmarks(self, landmarks: impl IntoIterator<Item = Landmark>) -> Self {
        Self {
            landmarks: landmarks.into_iter().collect(),
            ..self
        }
    }

    /// Returns an iterator over the positions of all eyebrow landmarks.
    pub fn brows(&self) -> impl Iterator<Item = Point> + '_ {
        self.landmarks
            .iter()
            .filter(|lm| lm.kind.is_brow())
            .map(|lm| lm.pos)
    }
}

/// The result of one detection cycle.
pub type DetectionOutcome = Result<Vec<DetectedFace>, DetectionError>;

/// A face detection capability.
pub trait FaceDetector {
    /// Detects faces in `frame`.
    ///
    /// `input_size` is the resolution the detector should downscale the frame to before running
    /// (smaller is faster but less accurate). Returned coordinates must be in the frame's own
    /// (capture space) coordinate system regardless of `input_size`.
    ///
    /// Errors are recoverable: the engine treats [`DetectionError::Failed`] as "no faces this
    /// cycle". Returning [`DetectionError::Unavailable`] disables detection permanently.
    fn detect(&mut self, frame: &Frame, input_size: u32) -> DetectionOutcome;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, frame: &Frame, input_size: u32) -> DetectionOutcome {
        (**self).detect(frame, input_size)
    }
}

/// Separates starting a detection from collecting its result.
///
/// The engine calls [`DetectionDriver::submit`] at most once until [`DetectionDriver::poll`] has
/// returned the previous outcome (the in-flight guard is enforced by the engine, not the driver).
pub trait DetectionDriver {
    /// Starts a detection cycle on `frame`.
    fn submit(&mut self, frame: Frame, input_size: u32);

    /// Returns the outcome of the submitted cycle once it has completed.
    ///
    /// Returns `None` while the cycle is still running or when nothing was submitted. Must not
    /// block.
    fn poll(&mut self) -> Option<DetectionOutcome>;
}

/// Runs a [`FaceDetector`] synchronously inside [`DetectionDriver::submit`].
pub struct InlineDriver<D> {
    detector: D,
    outcome: Option<DetectionOutcome>,
}

impl<D: FaceDetector> InlineDriver<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            outcome: None,
        }
    }
}

impl<D: FaceDetector> DetectionDriver for InlineDriver<D> {
    fn submit(&mut self, frame: Frame, input_size: u32) {
        self.outcome = Some(self.detector.detect(&frame, input_size));
    }

    fn poll(&mut self) -> Option<DetectionOutcome> {
        self.outcome.take()
    }
}

type Job = (Frame, u32, Promise<DetectionOutcome>);

/// Runs a [`FaceDetector`] on a dedicated worker thread.
///
/// Only the detector call runs on the worker; the outcome is handed back to the engine thread,
/// which applies it.
///
/// A panic inside the detector is logged and turns every later cycle into
/// [`DetectionError::Unavailable`]. It never propagates to the engine thread.
pub struct WorkerDriver {
    worker: Worker<Job>,
    pending: Option<PromiseHandle<DetectionOutcome>>,
}

impl WorkerDriver {
    /// Spawns the worker thread, moving `detector` onto it.
    pub fn spawn<D: FaceDetector + Send + 'static>(mut detector: D) -> io::Result<Self> {
        let mut crashed = false;
        let worker = Worker::spawn("face detector", 1, move |(frame, input_size, promise): Job| {
            if crashed {
                promise.fulfill(Err(DetectionError::Unavailable));
                return;
            }
            let detect = AssertUnwindSafe(|| detector.detect(&frame, input_size));
            match panic::catch_unwind(detect) {
                Ok(outcome) => promise.fulfill(outcome),
                Err(payload) => {
                    log::error!("face detector panicked: {}", panic_message(&*payload));
                    crashed = true;
                    promise.fulfill(Err(DetectionError::Unavailable));
                }
            }
        })?;
        Ok(Self {
            worker,
            pending: None,
        })
    }
}

impl DetectionDriver for WorkerDriver {
    fn submit(&mut self, frame: Frame, input_size: u32) {
        let (promise, handle) = promise();
        self.worker.send((frame, input_size, promise));
        self.pending = Some(handle);
    }

    fn poll(&mut self) -> Option<DetectionOutcome> {
        let outcome = self.pending.as_ref()?.try_take()?;
        self.pending = None;
        Some(outcome.unwrap_or_else(|_| {
            log::error!("face detector worker exited without producing a result");
            Err(DetectionError::Unavailable)
        }))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "<non-string panic payload>"
    }
}

/// Drops detections that cannot be used for positioning and clamps confidences into range.
pub(crate) fn sanitize(faces: Vec<DetectedFace>) -> Vec<DetectedFace> {
    let before = faces.len();
    let faces: Vec<_> = faces
        .into_iter()
        .filter(|face| {
            face.bbox.is_finite()
                && face.bbox.w > 0.0
                && face.bbox.h > 0.0
                && face
                    .landmarks
                    .iter()
                    .all(|lm| lm.pos.x.is_finite() && lm.pos.y.is_finite())
        })
        .map(|mut face| {
            face.confidence = if face.confidence.is_nan() {
                0.0
            } else {
                face.confidence.clamp(0.0, 1.0)
            };
            face
        })
        .collect();
    if faces.len() != before {
        log::debug!("dropped {} unusable detections", before - faces.len());
    }
    faces
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::image::Image;

    use super::*;

    struct Fixed(Vec<DetectedFace>);

    impl FaceDetector for Fixed {
        fn detect(&mut self, _: &Frame, _: u32) -> DetectionOutcome {
            Ok(self.0.clone())
        }
    }

    fn face(x: f32) -> DetectedFace {
        DetectedFace::new(BoundingBox::new(x, 10.0, 50.0, 60.0), 0.9)
    }

    #[test]
    fn inline_driver_completes_on_submit() {
        let mut driver = InlineDriver::new(Fixed(vec![face(1.0)]));
        assert!(driver.poll().is_none());
        driver.submit(Frame::new(Image::new(4, 4)), 128);
        assert_eq!(driver.poll().unwrap().unwrap().len(), 1);
        assert!(driver.poll().is_none());
    }

    #[test]
    fn worker_driver_delivers_outcome() {
        let mut driver = WorkerDriver::spawn(Fixed(vec![face(1.0), face(2.0)])).unwrap();
        driver.submit(Frame::new(Image::new(4, 4)), 128);
        assert_eq!(wait(&mut driver).unwrap().len(), 2);
        assert!(driver.poll().is_none());
    }

    struct Crashing;

    impl FaceDetector for Crashing {
        fn detect(&mut self, _: &Frame, _: u32) -> DetectionOutcome {
            panic!("model weights corrupted");
        }
    }

    fn wait(driver: &mut WorkerDriver) -> DetectionOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = driver.poll() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "detector worker never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn detector_panic_makes_detection_unavailable() {
        let mut driver = WorkerDriver::spawn(Crashing).unwrap();
        driver.submit(Frame::new(Image::new(4, 4)), 128);
        assert_eq!(wait(&mut driver), Err(DetectionError::Unavailable));

        driver.submit(Frame::new(Image::new(4, 4)), 128);
        assert_eq!(wait(&mut driver), Err(DetectionError::Unavailable));

        // Joining the worker must not resume the panic.
        drop(driver);
    }

    #[test]
    fn sanitize_drops_broken_boxes() {
        let mut nan = face(0.0);
        nan.bbox.x = f32::NAN;
        let mut empty = face(0.0);
        empty.bbox.w = 0.0;
        let mut overconfident = face(5.0);
        overconfident.confidence = 1.5;

        let faces = sanitize(vec![nan, empty, overconfident]);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].confidence, 1.0);
    }

    #[test]
    fn brows_filters_landmarks() {
        let face = face(0.0).with_landmarks([
            Landmark::new(LandmarkKind::LeftBrow, 10.0, 20.0),
            Landmark::new(LandmarkKind::Nose, 30.0, 40.0),
            Landmark::new(LandmarkKind::RightBrow, 30.0, 20.0),
        ]);
        let brows: Vec<_> = face.brows().collect();
        assert_eq!(brows, [Point::new(10.0, 20.0), Point::new(30.0, 20.0)]);
    }
}
