//! Temporal filtering of noisy measurements.

mod ema;

pub use ema::Ema;

use crate::geometry::Point;

/// A filter for values of type `V`.
pub trait Filter<V> {
    /// Adds a new value to the filter, returning the filtered value.
    fn push(&mut self, value: V) -> V;

    /// Resets the accumulated history and state of the filter to be identical to the state just
    /// after construction.
    fn reset(&mut self);
}

impl<V> Filter<V> for Box<dyn Filter<V>> {
    fn push(&mut self, value: V) -> V {
        (**self).push(value)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Applies an independent copy of a scalar filter to both coordinates of a [`Point`].
#[derive(Debug, Clone)]
pub struct PointFilter<F> {
    x: F,
    y: F,
}

impl<F: Filter<f32> + Clone> PointFilter<F> {
    pub fn new(filter: F) -> Self {
        Self {
            x: filter.clone(),
            y: filter,
        }
    }
}

impl<F: Filter<f32>> Filter<Point> for PointFilter<F> {
    fn push(&mut self, value: Point) -> Point {
        Point::new(self.x.push(value.x), self.y.push(value.y))
    }

    fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}
