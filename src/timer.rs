//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt,
    time::{Duration, Instant},
};

use crate::filter::{Ema, Filter};

/// A timer that measures how long an operation takes and keeps a running average.
///
/// The number of recorded timings is reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]); the average is kept.
pub struct Timer {
    name: &'static str,
    count: Cell<u32>,
    avg_ms: Ema,
    last: Duration,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            count: Cell::new(0),
            avg_ms: Ema::new(0.9),
            last: Duration::ZERO,
        }
    }

    /// Invokes a closure, measuring and recording the time it takes.
    ///
    /// Returns the closure's result along with the measured duration.
    pub fn time<T>(&mut self, timee: impl FnOnce() -> T) -> (T, Duration) {
        let start = Instant::now();
        let result = timee();
        let elapsed = start.elapsed();
        self.record(elapsed);
        (result, elapsed)
    }

    /// Records an externally measured duration.
    pub fn record(&mut self, duration: Duration) {
        self.count.set(self.count.get() + 1);
        self.last = duration;
        self.avg_ms.push(duration.as_secs_f32() * 1000.0);
    }

    /// Returns the most recently recorded duration.
    pub fn last(&self) -> Duration {
        self.last
    }

    /// Returns the averaged duration in milliseconds, if anything was recorded yet.
    pub fn average_ms(&self) -> Option<f32> {
        self.avg_ms.last()
    }

    fn take_count(&self) -> u32 {
        self.count.replace(0)
    }
}

/// Displays the number of timings since the last display, and the running average.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.average_ms() {
            Some(avg_ms) => write!(f, "{}: {}x{avg_ms:.01}ms", self.name, self.take_count()),
            None => write!(f, "{}: -", self.name),
        }
    }
}

/// Logs ticks per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    pub fn tick_with<'a, I>(&mut self, extra: I)
    where
        I: IntoIterator<Item = &'a Timer>,
    {
        self.frames += 1;
        if self.start.elapsed() <= Duration::from_secs(1) {
            return;
        }

        let extra = extra.into_iter().map(|t| t.to_string()).collect::<Vec<_>>();
        if extra.is_empty() {
            log::debug!("{}: {} FPS", self.name, self.frames);
        } else {
            log::debug!("{}: {} FPS ({})", self.name, self.frames, extra.join(", "));
        }

        self.frames = 0;
        self.start = Instant::now();
    }
}
