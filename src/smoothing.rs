//! Temporal stabilization of face anchors.
//!
//! Raw detections jitter from cycle to cycle. [`PositionSmoother`] derives a set of anchor points
//! from every detected face and runs each coordinate through an exponential moving average, keyed
//! by *slot*. Which slot a detection updates is decided by a [`SlotAssigner`].

use itertools::izip;

use crate::{
    detection::DetectedFace,
    error::ConfigError,
    filter::{Ema, Filter, PointFilter},
    geometry::Point,
};

/// How far above the bounding box the top of the head is assumed to be, relative to box height.
const CROWN_EXTRAPOLATION: f32 = 0.3;

/// Where the forehead is assumed to be (relative to box height, measured from the top) when the
/// detector reports no eyebrow landmarks.
const FOREHEAD_FALLBACK: f32 = 0.2;

/// Anchor points derived from a single detection, in capture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawAnchors {
    pub face_center: Point,
    pub forehead_center: Point,
    pub crown_estimate: Point,
    pub face_width: f32,
}

impl RawAnchors {
    /// Derives the anchor points of `face`.
    ///
    /// - The face center is the center of the bounding box.
    /// - The forehead is the mean of all eyebrow landmarks.
    /// - The crown is extrapolated above the top of the box, since no landmark exists there.
    pub fn from_face(face: &DetectedFace) -> Self {
        let bbox = &face.bbox;
        let face_center = bbox.center();

        let (sum, count) = face
            .brows()
            .fold((Point::origin(), 0), |(sum, n), p| {
                (Point::new(sum.x + p.x, sum.y + p.y), n + 1)
            });
        let forehead_center = if count == 0 {
            Point::new(face_center.x, bbox.y + bbox.h * FOREHEAD_FALLBACK)
        } else {
            Point::new(sum.x / count as f32, sum.y / count as f32)
        };

        let crown_estimate = Point::new(face_center.x, bbox.y - bbox.h * CROWN_EXTRAPOLATION);

        Self {
            face_center,
            forehead_center,
            crown_estimate,
            face_width: bbox.w,
        }
    }
}

/// Smoothed anchor points of one slot, in capture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedAnchor {
    pub face_center: Point,
    pub forehead_center: Point,
    pub crown_estimate: Point,
    /// Smoothed width of the face's bounding box, used for sizing.
    pub face_width: f32,
}

/// A face that was observed in the latest detection cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedFace {
    pub slot: usize,
    pub anchor: SmoothedAnchor,
    /// Confidence of the latest (unsmoothed) detection.
    pub confidence: f32,
}

/// Decides which slot each detection of a cycle updates.
///
/// Slot identity is what keeps a filter attached to the right face. Implementations may look at
/// the anchors of previous cycles (e.g. to match faces by proximity).
pub trait SlotAssigner {
    /// Returns one slot per entry of `faces`, in the same order. Slots must be distinct.
    ///
    /// `previous` lists every slot that has smoothing state, with its current anchor.
    fn assign(&mut self, faces: &[RawAnchors], previous: &[(usize, SmoothedAnchor)]) -> Vec<usize>;

    /// Forgets any state accumulated across cycles.
    fn reset(&mut self) {}
}

/// Assigns the *i*-th detection of every cycle to slot *i*.
///
/// This trusts the detector to report faces in a stable order. If two faces swap places in the
/// detector's output, their smoothed anchors swap as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionalSlots;

impl SlotAssigner for PositionalSlots {
    fn assign(&mut self, faces: &[RawAnchors], _: &[(usize, SmoothedAnchor)]) -> Vec<usize> {
        (0..faces.len()).collect()
    }
}

#[derive(Debug, Clone)]
struct SlotFilter {
    face_center: PointFilter<Ema>,
    forehead_center: PointFilter<Ema>,
    crown_estimate: PointFilter<Ema>,
    face_width: Ema,
}

impl SlotFilter {
    fn new(alpha: f32) -> Self {
        let ema = Ema::new(alpha);
        Self {
            face_center: PointFilter::new(ema),
            forehead_center: PointFilter::new(ema),
            crown_estimate: PointFilter::new(ema),
            face_width: ema,
        }
    }

    fn push(&mut self, raw: &RawAnchors) -> SmoothedAnchor {
        SmoothedAnchor {
            face_center: self.face_center.push(raw.face_center),
            forehead_center: self.forehead_center.push(raw.forehead_center),
            crown_estimate: self.crown_estimate.push(raw.crown_estimate),
            face_width: self.face_width.push(raw.face_width),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    filter: SlotFilter,
    anchor: SmoothedAnchor,
    confidence: f32,
}

/// Per-slot exponential smoothing of face anchors.
pub struct PositionSmoother {
    alpha: f32,
    assigner: Box<dyn SlotAssigner>,
    /// Indexed by slot. Slots are created on first observation and only removed by `reset`.
    slots: Vec<Option<Slot>>,
    /// Slots updated by the latest cycle, in detection order.
    tracked: Vec<usize>,
}

impl PositionSmoother {
    /// Creates a smoother using [`PositionalSlots`].
    ///
    /// `alpha` is the weight of the previous smoothed value (see [`Ema::new`]) and must lie
    /// strictly between 0 and 1.
    pub fn new(alpha: f32) -> Result<Self, ConfigError> {
        Self::with_assigner(alpha, PositionalSlots)
    }

    pub fn with_assigner<A: SlotAssigner + 'static>(
        alpha: f32,
        assigner: A,
    ) -> Result<Self, ConfigError> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        Ok(Self {
            alpha,
            assigner: Box::new(assigner),
            slots: Vec::new(),
            tracked: Vec::new(),
        })
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Feeds the detections of one cycle into the smoother.
    ///
    /// An empty slice (no faces, or a failed cycle) leaves no face tracked but keeps the smoothing
    /// state of every slot.
    pub fn update(&mut self, faces: &[DetectedFace]) {
        let raw: Vec<_> = faces.iter().map(RawAnchors::from_face).collect();
        let previous: Vec<_> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (i, s.anchor)))
            .collect();

        let assigned = if raw.is_empty() {
            Vec::new()
        } else {
            self.assigner.assign(&raw, &previous)
        };
        assert_eq!(
            assigned.len(),
            raw.len(),
            "slot assigner returned the wrong number of slots"
        );

        self.tracked.clear();
        for (slot_index, raw, face) in izip!(assigned, &raw, faces) {
            if slot_index >= self.slots.len() {
                self.slots.resize_with(slot_index + 1, || None);
            }

            let alpha = self.alpha;
            let slot = &mut self.slots[slot_index];
            match slot {
                Some(slot) => {
                    slot.anchor = slot.filter.push(raw);
                    slot.confidence = face.confidence;
                }
                None => {
                    log::trace!("new face slot {slot_index}");
                    let mut filter = SlotFilter::new(alpha);
                    let anchor = filter.push(raw);
                    *slot = Some(Slot {
                        filter,
                        anchor,
                        confidence: face.confidence,
                    });
                }
            }
            self.tracked.push(slot_index);
        }
    }

    /// Returns the faces observed in the latest cycle, with their smoothed anchors.
    pub fn tracked(&self) -> Vec<TrackedFace> {
        self.tracked
            .iter()
            .filter_map(|&i| {
                self.slots[i].as_ref().map(|slot| TrackedFace {
                    slot: i,
                    anchor: slot.anchor,
                    confidence: slot.confidence,
                })
            })
            .collect()
    }

    /// Returns the smoothed anchor of `slot`, whether or not it was observed in the latest cycle.
    pub fn anchor(&self, slot: usize) -> Option<&SmoothedAnchor> {
        self.slots.get(slot)?.as_ref().map(|s| &s.anchor)
    }

    /// Returns the number of slots with smoothing state.
    pub fn slot_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Drops all smoothing state.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.tracked.clear();
        self.assigner.reset();
    }
}
