use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    prelude::*,
    primitives::{
        Circle, Ellipse, Line, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle,
        RoundedRectangle, StyledDrawable, Triangle,
    },
};

use crate::image::{Color, Image, ImageViewMut, Rect};

/// Guard returned by the `draw_*` functions; draws the shape when dropped and allows
/// customization.
///
/// By default, shapes are filled with [`Color::WHITE`] and have no outline.
pub struct DrawShape<'a, P>
where
    P: StyledDrawable<PrimitiveStyle<Color>, Color = Color>,
{
    image: ImageViewMut<'a>,
    shape: P,
    fill: Option<Color>,
    stroke: Option<Color>,
    stroke_width: u32,
}

impl<'a, P> DrawShape<'a, P>
where
    P: StyledDrawable<PrimitiveStyle<Color>, Color = Color>,
{
    fn new(image: &'a mut Image, shape: P) -> Self {
        let rect = image.rect();
        Self {
            image: image.view_mut(rect),
            shape,
            fill: Some(Color::WHITE),
            stroke: None,
            stroke_width: 1,
        }
    }

    /// Sets the fill color.
    pub fn fill(&mut self, color: Color) -> &mut Self {
        self.fill = Some(color);
        self
    }

    /// Draws only the outline of the shape.
    pub fn no_fill(&mut self) -> &mut Self {
        self.fill = None;
        self
    }

    /// Draws an outline of the shape in `color`.
    pub fn stroke(&mut self, color: Color) -> &mut Self {
        self.stroke = Some(color);
        self
    }

    /// Sets the outline's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl<P> Drop for DrawShape<'_, P>
where
    P: StyledDrawable<PrimitiveStyle<Color>, Color = Color>,
{
    fn drop(&mut self) {
        let mut style = PrimitiveStyleBuilder::new();
        if let Some(fill) = self.fill {
            style = style.fill_color(fill);
        }
        if let Some(stroke) = self.stroke {
            style = style.stroke_color(stroke).stroke_width(self.stroke_width);
        }
        match self
            .shape
            .draw_styled(&style.build(), &mut Target(self.image.reborrow()))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a rectangle onto an image.
pub fn draw_rect(image: &mut Image, rect: Rect) -> DrawShape<'_, Rectangle> {
    DrawShape::new(image, rect.rect)
}

/// Draws a rectangle with rounded corners of the given radius onto an image.
pub fn draw_rounded_rect(
    image: &mut Image,
    rect: Rect,
    radius: u32,
) -> DrawShape<'_, RoundedRectangle> {
    DrawShape::new(
        image,
        RoundedRectangle::with_equal_corners(rect.rect, Size::new(radius, radius)),
    )
}

/// Draws a circle of the given diameter around `(x, y)` onto an image.
pub fn draw_circle(image: &mut Image, x: i32, y: i32, diameter: u32) -> DrawShape<'_, Circle> {
    DrawShape::new(image, Circle::with_center(Point::new(x, y), diameter))
}

/// Draws an ellipse filling `rect` onto an image.
pub fn draw_ellipse(image: &mut Image, rect: Rect) -> DrawShape<'_, Ellipse> {
    DrawShape::new(image, Ellipse::new(rect.rect.top_left, rect.rect.size))
}

/// Draws a triangle onto an image.
pub fn draw_triangle(
    image: &mut Image,
    a: (i32, i32),
    b: (i32, i32),
    c: (i32, i32),
) -> DrawShape<'_, Triangle> {
    DrawShape::new(
        image,
        Triangle::new(Point::new(a.0, a.1), Point::new(b.0, b.1), Point::new(c.0, c.1)),
    )
}

/// Draws a line onto an image.
///
/// Lines have no area, so they are drawn with their stroke color (white by default).
pub fn draw_line(
    image: &mut Image,
    start: (i32, i32),
    end: (i32, i32),
) -> DrawShape<'_, Line> {
    let mut shape = DrawShape::new(
        image,
        Line::new(Point::new(start.0, start.1), Point::new(end.0, end.1)),
    );
    shape.no_fill().stroke(Color::WHITE);
    shape
}

struct Target<'a>(ImageViewMut<'a>);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        let (width, height) = (self.0.width(), self.0.height());

        Rectangle {
            top_left: Point { x: 0, y: 0 },
            size: Size { width, height },
        }
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0.set(pos.x as _, pos.y as _, color);
            }
        }

        Ok(())
    }
}
