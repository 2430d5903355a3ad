//! Interleaving of detection cycles and render ticks.
//!
//! The [`OverlayScheduler`] does not own any timers. It is driven by an explicit clock: the host
//! (or a test) calls [`OverlayScheduler::poll`] with the current time and gets back the ticks that
//! are due. This keeps the scheduler deterministic and lets everything run on a single thread.

use std::time::Duration;

/// Identifies one activation of a scheduler.
///
/// Work that was started under a token that is no longer [current][OverlayScheduler::is_current]
/// belongs to a previous activation and must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancellationToken(u64);

/// Work that is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Start a detection cycle.
    Detect,
    /// Clear and repaint the overlay.
    Render,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active {
        token: CancellationToken,
        next_detect: Option<Duration>,
        next_render: Duration,
    },
}

/// Idle/Active state machine scheduling the detection timer and the render loop.
#[derive(Debug)]
pub struct OverlayScheduler {
    render_interval: Duration,
    detection_interval: Option<Duration>,
    state: State,
    generation: u64,
}

impl OverlayScheduler {
    /// Creates an idle scheduler.
    ///
    /// A `detection_interval` of `None` schedules no detection cycles at all.
    ///
    /// # Panics
    ///
    /// Panics if `render_interval` is zero.
    pub fn new(render_interval: Duration, detection_interval: Option<Duration>) -> Self {
        assert!(!render_interval.is_zero(), "render interval must be non-zero");
        Self {
            render_interval,
            detection_interval: detection_interval.filter(|i| !i.is_zero()),
            state: State::Idle,
            generation: 0,
        }
    }

    /// Activates the scheduler. The first detection cycle and render tick are due immediately.
    ///
    /// If the scheduler is already active, it is stopped first, so that there is never more than
    /// one render loop. Returns the token of the new activation.
    pub fn start(&mut self, now: Duration) -> CancellationToken {
        if self.is_active() {
            log::debug!("scheduler already active, restarting");
            self.stop();
        }

        self.generation += 1;
        let token = CancellationToken(self.generation);
        self.state = State::Active {
            token,
            next_detect: self.detection_interval.map(|_| now),
            next_render: now,
        };
        log::debug!("scheduler started ({token:?})");
        token
    }

    /// Deactivates the scheduler, cancelling all pending ticks. Does nothing if already idle.
    pub fn stop(&mut self) {
        if let State::Active { token, .. } = self.state {
            log::debug!("scheduler stopped ({token:?})");
            self.state = State::Idle;
        }
    }

    /// Stops and starts the scheduler again.
    pub fn restart(&mut self, now: Duration) -> CancellationToken {
        self.stop();
        self.start(now)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active { .. })
    }

    /// Returns the token of the current activation, or `None` if the scheduler is idle.
    pub fn token(&self) -> Option<CancellationToken> {
        match self.state {
            State::Active { token, .. } => Some(token),
            State::Idle => None,
        }
    }

    /// Returns whether `token` belongs to the current activation.
    pub fn is_current(&self, token: CancellationToken) -> bool {
        self.token() == Some(token)
    }

    pub fn render_interval(&self) -> Duration {
        self.render_interval
    }

    pub fn detection_interval(&self) -> Option<Duration> {
        self.detection_interval
    }

    /// Changes the detection interval. `None` stops scheduling detection cycles.
    ///
    /// A cycle that is already scheduled keeps its deadline. If no cycle was scheduled, the next
    /// one is due one interval after `now`.
    pub fn set_detection_interval(&mut self, interval: Option<Duration>, now: Duration) {
        let interval = interval.filter(|i| !i.is_zero());
        if interval == self.detection_interval {
            return;
        }
        log::trace!("detection interval: {:?}", interval);
        self.detection_interval = interval;

        if let State::Active { next_detect, .. } = &mut self.state {
            *next_detect = match (interval, *next_detect) {
                (None, _) => None,
                (Some(_), Some(next)) => Some(next),
                (Some(interval), None) => Some(now + interval),
            };
        }
    }

    /// Returns the ticks that are due at `now`, in the order they should be processed.
    ///
    /// [`Tick::Detect`] is always returned before [`Tick::Render`], so that a render tick sees the
    /// results of a detection cycle completed in the same poll. If several render ticks were
    /// missed, only one is returned and the loop continues one interval after `now`.
    pub fn poll(&mut self, now: Duration) -> Vec<Tick> {
        let State::Active {
            next_detect,
            next_render,
            ..
        } = &mut self.state
        else {
            return Vec::new();
        };

        let mut ticks = Vec::new();
        if let (Some(next), Some(interval)) = (next_detect.as_mut(), self.detection_interval) {
            if *next <= now {
                ticks.push(Tick::Detect);
                *next = advance(*next, interval, now);
            }
        }
        if *next_render <= now {
            ticks.push(Tick::Render);
            *next_render = advance(*next_render, self.render_interval, now);
        }
        ticks
    }

    /// Returns the time at which the next tick is due, or `None` if the scheduler is idle.
    pub fn next_deadline(&self) -> Option<Duration> {
        match self.state {
            State::Active {
                next_detect,
                next_render,
                ..
            } => Some(next_detect.map_or(next_render, |d| d.min(next_render))),
            State::Idle => None,
        }
    }
}

fn advance(deadline: Duration, interval: Duration, now: Duration) -> Duration {
    let next = deadline + interval;
    if next <= now {
        // Fell behind; coalesce everything that was missed.
        now + interval
    } else {
        next
    }
}
