use super::{Color, ImageView, ImageViewMut};

/// Composites a source image over a destination area when dropped.
///
/// The source is stretched over the whole destination with nearest-neighbor sampling. Colors are
/// mixed in linear light, so semi-transparent edges of scaled sprites don't darken.
///
/// Returned by [`Image::blend_from`][super::Image::blend_from] or [`ImageViewMut::blend_from`].
pub struct Blend<'a> {
    dest: ImageViewMut<'a>,
    src: ImageView<'a>,
    opacity: f32,
}

impl<'a> Blend<'a> {
    pub(super) fn new(dest: ImageViewMut<'a>, src: ImageView<'a>) -> Self {
        Self {
            dest,
            src,
            opacity: 1.0,
        }
    }

    /// Scales the alpha of every source pixel by `opacity`, clamped to 0.0 to 1.0.
    pub fn opacity(&mut self, opacity: f32) -> &mut Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

impl Drop for Blend<'_> {
    fn drop(&mut self) {
        let (dw, dh) = (self.dest.width(), self.dest.height());
        let (sw, sh) = (self.src.width(), self.src.height());
        if sw == 0 || sh == 0 {
            return;
        }

        let src_xs: Vec<u32> = (0..dw).map(|x| sample(x, dw, sw)).collect();
        for y in 0..dh {
            let src_y = sample(y, dh, sh);
            for (x, &src_x) in (0..dw).zip(&src_xs) {
                let mut over = self.src.get(src_x, src_y);
                if self.opacity < 1.0 {
                    over.0[3] = (f32::from(over.a()) * self.opacity).round() as u8;
                }
                if over.a() == 0 {
                    continue;
                }
                let under = self.dest.get(x, y);
                self.dest.set(x, y, source_over(under, over));
            }
        }
    }
}

/// Maps destination coordinate `i` (of `dest_len`) to the source pixel covering its center.
fn sample(i: u32, dest_len: u32, src_len: u32) -> u32 {
    let pos = (i as f32 + 0.5) / dest_len as f32 * src_len as f32;
    (pos as u32).min(src_len - 1)
}

/// Porter-Duff "over" with straight (non-premultiplied) alpha.
fn source_over(under: Color, over: Color) -> Color {
    if over.a() == 255 || under.a() == 0 {
        return over;
    }

    let ao = f32::from(over.a()) / 255.0;
    let au = f32::from(under.a()) / 255.0;
    let alpha = ao + au * (1.0 - ao);

    let mut out = [0; 4];
    for (c, out) in out.iter_mut().enumerate().take(3) {
        let lo = to_linear(over.0[c]);
        let lu = to_linear(under.0[c]);
        *out = from_linear((lo * ao + lu * au * (1.0 - ao)) / alpha);
    }
    out[3] = quantize(alpha);
    Color(out)
}

fn to_linear(c: u8) -> f32 {
    let c = f32::from(c) / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn from_linear(l: f32) -> u8 {
    let c = if l <= 0.0031308 {
        l * 12.92
    } else {
        1.055 * l.powf(1.0 / 2.4) - 0.055
    };
    quantize(c)
}

fn quantize(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
