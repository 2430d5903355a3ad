use std::fmt;

use embedded_graphics::{
    prelude::{Point, Size},
    primitives::Rectangle,
};

/// An integer rectangle in pixel coordinates, possibly empty.
///
/// The position may be negative, so a rectangle can describe a sprite that hangs off the top or
/// left edge of an [`Image`][super::Image].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub(crate) rect: Rectangle,
}

impl Rect {
    /// Creates a `width x height` rectangle centered on `(x, y)`.
    ///
    /// For odd sizes the extra pixel goes to the right and bottom.
    pub fn from_center(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self::from_top_left(x - (width / 2) as i32, y - (height / 2) as i32, width, height)
    }

    #[inline]
    pub fn from_top_left(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            rect: Rectangle::new(Point::new(x, y), Size::new(width, height)),
        }
    }

    /// Creates the rectangle spanning from `top_left` to `bottom_right`, both inclusive.
    ///
    /// # Panics
    ///
    /// Panics if `bottom_right` lies above or left of `top_left`.
    pub fn from_corners(top_left: (i32, i32), bottom_right: (i32, i32)) -> Self {
        let ((x0, y0), (x1, y1)) = (top_left, bottom_right);
        assert!(x0 <= x1 && y0 <= y1, "invalid corners {top_left:?}, {bottom_right:?}");
        Self::from_top_left(x0, y0, x1.abs_diff(x0) + 1, y1.abs_diff(y0) + 1)
    }

    #[inline]
    pub fn x(&self) -> i32 {
        self.rect.top_left.x
    }

    #[inline]
    pub fn y(&self) -> i32 {
        self.rect.top_left.y
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.rect.size.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.rect.size.height
    }

    pub fn is_empty(&self) -> bool {
        self.rect.is_zero_sized()
    }

    /// Returns the area covered by both rectangles, or `None` if they don't overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let rect = self.rect.intersection(&other.rect);
        (!rect.is_zero_sized()).then_some(Rect { rect })
    }

    /// Returns the bounding box of both rectangles. Empty rectangles are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        match (self.is_empty(), other.is_empty()) {
            (_, true) => *self,
            (true, false) => *other,
            (false, false) => {
                let (x0, y0) = (self.x().min(other.x()), self.y().min(other.y()));
                let x1 = self.right().max(other.right());
                let y1 = self.bottom().max(other.bottom());
                let width = (x1 - i64::from(x0)) as u32;
                let height = (y1 - i64::from(y0)) as u32;
                Rect::from_top_left(x0, y0, width, height)
            }
        }
    }

    /// Returns whether the pixel `(x, y)` is covered by this rectangle.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.x()..).contains(&x)
            && (self.y()..).contains(&y)
            && i64::from(x) < self.right()
            && i64::from(y) < self.bottom()
    }

    /// Exclusive right edge.
    fn right(&self) -> i64 {
        i64::from(self.x()) + i64::from(self.width())
    }

    /// Exclusive bottom edge.
    fn bottom(&self) -> i64 {
        i64::from(self.y()) + i64::from(self.height())
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}, {}, {}x{})",
            self.x(),
            self.y(),
            self.width(),
            self.height()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered() {
        assert_eq!(Rect::from_center(10, 10, 4, 6), Rect::from_top_left(8, 7, 4, 6));
        assert_eq!(Rect::from_center(0, 0, 3, 3), Rect::from_top_left(-1, -1, 3, 3));
    }

    #[test]
    fn corners_are_inclusive() {
        let r = Rect::from_corners((-2, 3), (2, 3));
        assert_eq!((r.width(), r.height()), (5, 1));
        assert!(r.contains(-2, 3));
        assert!(r.contains(2, 3));
        assert!(!r.contains(3, 3));
        assert!(!r.contains(0, 4));
    }

    #[test]
    fn overlap() {
        let screen = Rect::from_top_left(0, 0, 100, 50);
        let sprite = Rect::from_center(0, 0, 20, 20);
        assert_eq!(
            sprite.intersection(&screen),
            Some(Rect::from_top_left(0, 0, 10, 10))
        );
        assert_eq!(screen.intersection(&Rect::from_top_left(100, 0, 5, 5)), None);
        assert_eq!(screen.intersection(&screen), Some(screen));
    }

    #[test]
    fn bounding_box() {
        let a = Rect::from_top_left(0, 0, 2, 2);
        let b = Rect::from_top_left(5, -1, 1, 1);
        assert_eq!(a.union(&b), Rect::from_top_left(0, -1, 6, 3));
        assert_eq!(a.union(&Rect::from_top_left(100, 100, 0, 0)), a);
        assert_eq!(Rect::from_top_left(7, 7, 0, 3).union(&b), b);
    }
}
