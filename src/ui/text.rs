//! Fixed-pitch bitmap text drawing for labels, buttons, and editors.

use font8x8::legacy::BASIC_LEGACY;

use crate::geom::{pt, Point};
use crate::rfb::image::{Color, PixelFormatImage};

/// Glyph cell size of the 8x8 face.
pub const GLYPH_WIDTH: i32 = 8;
pub const GLYPH_HEIGHT: i32 = 8;

/// Draw `text` with its top-left corner at `origin`. Non-ASCII
/// characters render as blanks; pixels outside the image are clipped.
pub fn draw_text(img: &mut PixelFormatImage, origin: Point, text: &str, color: Color) {
    let bounds = img.bounds();
    let mut x = origin.x;
    for ch in text.chars() {
        if let Some(glyph) = BASIC_LEGACY.get(ch as usize) {
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    let p = pt(x + col, origin.y + row as i32);
                    if bounds.contains(p) {
                        img.set(p.x, p.y, color);
                    }
                }
            }
        }
        x += GLYPH_WIDTH;
    }
}
