//! RGBA rasters for filter artwork and the overlay surface.
//!
//! [`Image`] owns its pixels. [`ImageView`] and [`ImageViewMut`] borrow a rectangular window of
//! one, which may extend past the image's edges: reads outside of the image return
//! [`Color::NULL`] and writes there are dropped. This lets the renderer paint sprites that are
//! partially off-screen without clipping them first.
//!
//! Shapes are drawn with the `draw_*` functions, and images are composited with
//! [`Image::blend_from`].

mod blend;
mod draw;
mod rect;

#[cfg(test)]
mod tests;

use std::{fmt, path::Path};

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{imageops::FilterType, ImageBuffer, Rgba, RgbaImage};

use crate::geometry::Resolution;

pub use blend::*;
pub use draw::*;
pub use rect::*;

/// An 8-bit sRGB image with a straight alpha channel.
#[derive(Clone, PartialEq)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Creates a fully transparent image of size `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Writes the image to `path`, in the format implied by its extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.buf.save(path.as_ref())
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.buf.width(), self.buf.height())
    }

    /// Returns the rectangle spanning the whole image, with its top left corner at `(0, 0)`.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::from_top_left(0, 0, self.buf.width(), self.buf.height())
    }

    /// Returns the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside of the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf.get_pixel(x, y).0)
    }

    /// Overwrites the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside of the image.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf.put_pixel(x, y, Rgba(color.0));
    }

    /// Iterates over all pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Color> + '_ {
        self.buf.pixels().map(|pix| Color(pix.0))
    }

    /// Borrows the window `rect` of this image for reading.
    pub fn view(&self, rect: Rect) -> ImageView<'_> {
        ImageView { image: self, rect }
    }

    /// Borrows the window `rect` of this image for writing.
    pub fn view_mut(&mut self, rect: Rect) -> ImageViewMut<'_> {
        ImageViewMut { image: self, rect }
    }

    /// Returns a copy scaled to `width x height` with a triangle (bilinear) filter.
    pub fn resized(&self, width: u32, height: u32) -> Image {
        if self.resolution() == Resolution::new(width, height) {
            return self.clone();
        }
        Image {
            buf: image::imageops::resize(&self.buf, width, height, FilterType::Triangle),
        }
    }

    /// Composites `src` over the whole image, stretching it to fit.
    ///
    /// The blend happens when the returned [`Blend`] is dropped. To target part of the image, blend
    /// into a view obtained from [`Image::view_mut`] instead.
    pub fn blend_from<'b>(&'b mut self, src: &'b Image) -> Blend<'b> {
        let rect = self.rect();
        Blend::new(self.view_mut(rect), src.view(src.rect()))
    }

    /// Sets every pixel to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| *pix = Rgba(color.0));
    }

    /// Sets every pixel inside `rect` to `color`. Parts of `rect` outside of the image are ignored.
    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let Some(rect) = rect.intersection(&self.rect()) else {
            return;
        };
        let (x0, y0) = (rect.x() as u32, rect.y() as u32);
        for y in y0..y0 + rect.height() {
            for x in x0..x0 + rect.width() {
                self.buf.put_pixel(x, y, Rgba(color.0));
            }
        }
    }

    /// Makes every pixel inside `rect` fully transparent.
    pub fn clear_rect(&mut self, rect: Rect) {
        self.fill_rect(rect, Color::NULL);
    }

    /// Returns `true` if no pixel has any coverage.
    pub fn is_transparent(&self) -> bool {
        self.buf.pixels().all(|pix| pix.0[3] == 0)
    }

    /// Translates view-relative coordinates into image coordinates, if they are inside the image.
    fn locate(&self, window: &Rect, x: u32, y: u32) -> Option<(u32, u32)> {
        let abs_x = u32::try_from(i64::from(window.x()) + i64::from(x)).ok()?;
        let abs_y = u32::try_from(i64::from(window.y()) + i64::from(y)).ok()?;
        (abs_x < self.width() && abs_y < self.height()).then_some((abs_x, abs_y))
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Image").field(&self.resolution()).finish()
    }
}

/// A read-only window into an [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    rect: Rect,
}

impl<'a> ImageView<'a> {
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// Returns the pixel at `(x, y)` relative to the window, or [`Color::NULL`] if that lies
    /// outside of the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.image
            .locate(&self.rect, x, y)
            .map_or(Color::NULL, |(x, y)| self.image.get(x, y))
    }
}

/// A writable window into an [`Image`].
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    image: &'a mut Image,
    rect: Rect,
}

impl<'a> ImageViewMut<'a> {
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// Returns the pixel at `(x, y)` relative to the window, or [`Color::NULL`] if that lies
    /// outside of the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.image
            .locate(&self.rect, x, y)
            .map_or(Color::NULL, |(x, y)| self.image.get(x, y))
    }

    /// Overwrites the pixel at `(x, y)` relative to the window. Does nothing if that lies outside
    /// of the image.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if let Some((x, y)) = self.image.locate(&self.rect, x, y) {
            self.image.set(x, y, color);
        }
    }

    /// Reborrows the same window for a shorter lifetime.
    pub fn reborrow(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            image: &mut *self.image,
            rect: self.rect,
        }
    }

    /// Composites `src` over this window, stretching it to fit.
    pub fn blend_from<'b>(&'b mut self, src: &'b Image) -> Blend<'b> {
        Blend::new(self.reborrow(), src.view(src.rect()))
    }
}

/// An 8-bit sRGB color with straight (non-premultiplied) alpha.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Transparent black.
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self::from_rgb8(0, 0, 0);
    pub const WHITE: Self = Self::from_rgb8(255, 255, 255);
    pub const RED: Self = Self::from_rgb8(255, 0, 0);
    pub const GREEN: Self = Self::from_rgb8(0, 255, 0);
    pub const BLUE: Self = Self::from_rgb8(0, 0, 255);
    pub const YELLOW: Self = Self::from_rgb8(255, 255, 0);

    /// Creates an opaque color.
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }

    /// Returns this color with its alpha replaced by `a`.
    #[must_use]
    pub fn with_alpha(self, a: u8) -> Color {
        let [r, g, b, _] = self.0;
        Color([r, g, b, a])
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

// Lets `Color` be used as the drawing color of `embedded-graphics` primitives.
impl PixelColor for Color {
    type Raw = RawU32;
}
