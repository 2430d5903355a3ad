use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let mut image = Image::new(W as u32, H as u32);
    for (y, row) in data.iter().enumerate() {
        for (x, color) in row.iter().enumerate() {
            image.set(x as u32, y as u32, *color);
        }
    }
    image
}

#[test]
fn view() {
    let image = mkimage([[C::RED, C::GREEN]]);

    let view = image.view(Rect::from_corners((1, 0), (1, 0)));
    assert_eq!(view.width(), 1);
    assert_eq!(view.height(), 1);
    assert_eq!(view.get(0, 0), C::GREEN);

    let view = image.view(Rect::from_top_left(1, 0, 2, 1));
    assert_eq!(view.width(), 2);
    assert_eq!(view.get(0, 0), C::GREEN);
    assert_eq!(view.get(1, 0), C::NULL);
}

#[test]
fn view_mut_ignores_out_of_bounds_writes() {
    let mut image = mkimage([[C::RED, C::RED]]);
    let mut view = image.view_mut(Rect::from_top_left(-1, 0, 2, 1));
    view.set(0, 0, C::BLUE);
    view.set(1, 0, C::BLUE);
    assert_eq!(image.get(0, 0), C::BLUE);
    assert_eq!(image.get(1, 0), C::RED);
}

#[test]
fn blend() {
    let mut image = mkimage([[C::RED, C::RED]]);
    image.blend_from(&mkimage([[C::GREEN.with_alpha(0), C::GREEN]]));
    // Fully transparent source pixels leave the destination alone, opaque ones replace it.
    assert_eq!(image.get(0, 0), C::RED);
    assert_eq!(image.get(1, 0), C::GREEN);

    let mut image = mkimage([[C::NULL]]);
    image.blend_from(&mkimage([[C::GREEN.with_alpha(100)]]));
    assert_eq!(image.get(0, 0), C::GREEN.with_alpha(100));

    // Both semi-transparent: coverage adds up.
    let mut image = mkimage([[C::BLUE.with_alpha(128)]]);
    image.blend_from(&mkimage([[C::RED.with_alpha(128)]]));
    let pix = image.get(0, 0);
    assert_eq!(pix.a(), 192);
    assert!(pix.r() > pix.b());
}

#[test]
fn blend_stretches_source() {
    let mut image = Image::new(4, 2);
    image.blend_from(&mkimage([[C::RED, C::BLUE]]));
    assert_eq!(image.get(1, 1), C::RED);
    assert_eq!(image.get(2, 0), C::BLUE);
}

#[test]
fn blend_opacity() {
    let mut image = mkimage([[C::NULL, C::NULL]]);
    let overlay = mkimage([[C::WHITE, C::WHITE.with_alpha(0)]]);
    image.blend_from(&overlay).opacity(0.5);
    assert_eq!(image.get(0, 0), C::WHITE.with_alpha(128));
    assert_eq!(image.get(1, 0), C::NULL);

    let mut image = mkimage([[C::BLACK]]);
    image.blend_from(&mkimage([[C::WHITE]])).opacity(0.5);
    let pix = image.get(0, 0);
    assert_eq!(pix.a(), 255);
    assert!(pix.r() > 127 && pix.r() == pix.g() && pix.g() == pix.b());
}

#[test]
fn blend_into_view() {
    let mut image = Image::new(4, 4);
    let sprite = mkimage([[C::RED, C::RED], [C::RED, C::RED]]);
    image
        .view_mut(Rect::from_top_left(3, 3, 2, 2))
        .blend_from(&sprite);
    assert_eq!(image.get(3, 3), C::RED);
    assert_eq!(image.get(2, 2), C::NULL);
    assert_eq!(image.pixels().filter(|c| *c != C::NULL).count(), 1);
}

#[test]
fn clear_rect() {
    let mut image = mkimage([[C::RED, C::RED], [C::RED, C::RED]]);
    image.clear_rect(Rect::from_top_left(1, -5, 10, 10));
    assert_eq!(image.get(0, 0), C::RED);
    assert_eq!(image.get(1, 0), C::NULL);
    assert_eq!(image.get(1, 1), C::NULL);

    image.clear(C::NULL);
    assert!(image.is_transparent());
}

#[test]
fn draw_shapes() {
    let mut image = Image::new(9, 9);
    draw_rect(&mut image, Rect::from_top_left(2, 2, 3, 3)).fill(C::BLUE);
    assert_eq!(image.get(3, 3), C::BLUE);
    assert_eq!(image.get(1, 1), C::NULL);

    let mut image = Image::new(9, 9);
    draw_circle(&mut image, 4, 4, 5).fill(C::RED);
    assert_eq!(image.get(4, 4), C::RED);
    assert_eq!(image.get(0, 0), C::NULL);

    let mut image = Image::new(9, 9);
    draw_line(&mut image, (0, 0), (8, 0)).stroke(C::GREEN);
    assert_eq!(image.get(5, 0), C::GREEN);
    assert_eq!(image.get(5, 1), C::NULL);

    // Shapes extending past the edges are clipped.
    let mut image = Image::new(4, 4);
    draw_triangle(&mut image, (-10, -10), (20, -10), (-10, 20)).fill(C::WHITE);
    assert_eq!(image.get(0, 0), C::WHITE);
}

#[test]
fn resized() {
    let image = mkimage([[C::RED, C::RED], [C::RED, C::RED]]);
    let big = image.resized(6, 4);
    assert_eq!(big.resolution(), Resolution::new(6, 4));
    assert!(big.pixels().all(|c| c == C::RED));
}
