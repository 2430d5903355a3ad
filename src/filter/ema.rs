//! Exponential Moving Average.

use super::Filter;

/// An Exponential Moving Average (EMA) filter.
///
/// Each output is a convex combination of the previous output and the new input:
/// `out = prev * alpha + value * (1 - alpha)`. The first value pushed after construction or
/// [`Filter::reset`] is passed through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    alpha: f32,
    last: Option<f32>,
}

impl Ema {
    /// Creates a new Exponential Moving Average filter.
    ///
    /// `alpha` is the weight of the previously filtered value. Values close to 1.0 result in a
    /// very stable but slow-moving output, values close to 0.0 follow the input closely.
    ///
    /// # Panics
    ///
    /// This method will panic if `alpha` is not in between 0.0 and 1.0.
    pub fn new(alpha: f32) -> Self {
        assert!((0.0..=1.0).contains(&alpha), "invalid EMA alpha {alpha}");
        Self { alpha, last: None }
    }

    /// Returns the last filtered value, if any value has been pushed yet.
    pub fn last(&self) -> Option<f32> {
        self.last
    }
}

impl Filter<f32> for Ema {
    fn push(&mut self, value: f32) -> f32 {
        let avg = match self.last {
            // Written as a step from `last` towards `value` so that a converged filter stays
            // bit-exact, and clamped so that rounding can never overshoot the input.
            Some(last) => {
                let step = last + (value - last) * (1.0 - self.alpha);
                step.clamp(last.min(value), last.max(value))
            }
            None => value,
        };
        self.last = Some(avg);
        avg
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
