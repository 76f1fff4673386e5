//! An addressable 2-D image whose byte layout obeys a runtime-chosen
//! [`PixelFormat`].
//!
//! The buffer holds exactly what goes on the wire for a Raw-encoded
//! rectangle, so a painted image is transmitted without conversion.

use crate::geom::{pt, Point, Rect};
use crate::rfb::protocol::PixelFormat;

/// An opaque colour; alpha is not stored and reads back as 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const WHITE: Color = Color {
    r: 255,
    g: 255,
    b: 255,
};
pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

/// An owned pixel buffer governed by a [`PixelFormat`], bounded by a
/// rectangle whose origin need not be (0, 0).
///
/// `get` and `set` panic when the format's bits-per-pixel is not 8, 16,
/// or 32, or when a channel max is not 255; sessions validate formats
/// before painting, so those panics indicate internal bugs.
#[derive(Debug, Clone)]
pub struct PixelFormatImage {
    pix: Vec<u8>,
    rect: Rect,
    format: PixelFormat,
}

impl PixelFormatImage {
    /// Allocate a zeroed image covering `rect`.
    pub fn new(format: PixelFormat, rect: Rect) -> PixelFormatImage {
        let len = format.bytes_per_pixel() * rect.dx() as usize * rect.dy() as usize;
        PixelFormatImage {
            pix: vec![0; len],
            rect,
            format,
        }
    }

    /// Wrap a received Raw payload as an image over `rect`.
    pub fn from_pixel_bytes(format: PixelFormat, rect: Rect, pix: Vec<u8>) -> PixelFormatImage {
        assert_eq!(
            pix.len(),
            format.bytes_per_pixel() * rect.dx() as usize * rect.dy() as usize,
            "payload length doesn't match the rectangle"
        );
        PixelFormatImage { pix, rect, format }
    }

    pub fn bounds(&self) -> Rect {
        self.rect
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The buffer in wire order, ready to send as a Raw rectangle.
    pub fn pixel_bytes(&self) -> &[u8] {
        &self.pix
    }

    fn idx(&self, x: i32, y: i32) -> usize {
        let bpp = self.format.bytes_per_pixel();
        bpp * ((y - self.rect.min.y) as usize * self.rect.dx() as usize
            + (x - self.rect.min.x) as usize)
    }

    fn check_channel_maxes(&self) {
        let f = &self.format;
        if f.red_max != 255 || f.green_max != 255 || f.blue_max != 255 {
            panic!(
                "max red, green, and blue must be 255, but are {}, {}, and {}",
                f.red_max, f.green_max, f.blue_max
            );
        }
    }

    /// Read the pixel at (x, y). Panics outside the bounds.
    pub fn get(&self, x: i32, y: i32) -> Color {
        self.check_channel_maxes();
        let idx = self.idx(x, y);
        let f = &self.format;
        let pixel = match f.bits_per_pixel {
            8 => self.pix[idx] as u32,
            16 => {
                let raw = [self.pix[idx], self.pix[idx + 1]];
                if f.big_endian {
                    u16::from_be_bytes(raw) as u32
                } else {
                    u16::from_le_bytes(raw) as u32
                }
            }
            32 => {
                let raw = [
                    self.pix[idx],
                    self.pix[idx + 1],
                    self.pix[idx + 2],
                    self.pix[idx + 3],
                ];
                if f.big_endian {
                    u32::from_be_bytes(raw)
                } else {
                    u32::from_le_bytes(raw)
                }
            }
            other => panic!("bits-per-pixel must be 8, 16, or 32, but it's {other}"),
        };
        Color {
            r: ((pixel >> f.red_shift) & f.red_max as u32) as u8,
            g: ((pixel >> f.green_shift) & f.green_max as u32) as u8,
            b: ((pixel >> f.blue_shift) & f.blue_max as u32) as u8,
        }
    }

    /// Write the pixel at (x, y). Panics outside the bounds.
    pub fn set(&mut self, x: i32, y: i32, c: Color) {
        self.check_channel_maxes();
        let f = self.format;
        let pixel = ((c.r as u32 & f.red_max as u32) << f.red_shift)
            | ((c.g as u32 & f.green_max as u32) << f.green_shift)
            | ((c.b as u32 & f.blue_max as u32) << f.blue_shift);
        let idx = self.idx(x, y);
        match f.bits_per_pixel {
            8 => self.pix[idx] = pixel as u8,
            16 => {
                let raw = if f.big_endian {
                    (pixel as u16).to_be_bytes()
                } else {
                    (pixel as u16).to_le_bytes()
                };
                self.pix[idx..idx + 2].copy_from_slice(&raw);
            }
            32 => {
                let raw = if f.big_endian {
                    pixel.to_be_bytes()
                } else {
                    pixel.to_le_bytes()
                };
                self.pix[idx..idx + 4].copy_from_slice(&raw);
            }
            other => panic!("bits-per-pixel must be 8, 16, or 32, but it's {other}"),
        }
    }

    /// Fill `rect` (clipped to the bounds) with a solid colour.
    pub fn fill(&mut self, rect: Rect, c: Color) {
        let x0 = rect.min.x.max(self.rect.min.x);
        let y0 = rect.min.y.max(self.rect.min.y);
        let x1 = rect.max.x.min(self.rect.max.x);
        let y1 = rect.max.y.min(self.rect.max.y);
        for y in y0..y1 {
            for x in x0..x1 {
                self.set(x, y, c);
            }
        }
    }

    /// Copy `src` into `dst_rect`, reading from `src_origin` onward.
    /// Source alpha is ignored; pixels outside either image are skipped.
    pub fn draw_image(&mut self, dst_rect: Rect, src: &PixelFormatImage, src_origin: Point) {
        for dy in 0..dst_rect.dy() {
            for dx in 0..dst_rect.dx() {
                let dst = pt(dst_rect.min.x + dx, dst_rect.min.y + dy);
                let sp = pt(src_origin.x + dx, src_origin.y + dy);
                if !self.rect.contains(dst) || !src.bounds().contains(sp) {
                    continue;
                }
                self.set(dst.x, dst.y, src.get(sp.x, sp.y));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn little_endian_argb() -> PixelFormat {
        let mut fmt = PixelFormat::rgba32();
        fmt.big_endian = false;
        fmt.red_shift = 16;
        fmt.green_shift = 8;
        fmt.blue_shift = 0;
        fmt
    }

    #[test]
    fn allocates_by_format_and_rect() {
        let img = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(0, 0, 320, 8));
        assert_eq!(img.pixel_bytes().len(), 4 * 320 * 8);
        assert!(img.pixel_bytes().iter().all(|&b| b == 0));

        let mut fmt = PixelFormat::rgba32();
        fmt.bits_per_pixel = 8;
        let img = PixelFormatImage::new(fmt, Rect::new(0, 0, 10, 10));
        assert_eq!(img.pixel_bytes().len(), 100);
    }

    #[test]
    fn pixel_round_trip_32bpp() {
        for big_endian in [false, true] {
            let mut fmt = PixelFormat::rgba32();
            fmt.big_endian = big_endian;
            let mut img = PixelFormatImage::new(fmt, Rect::new(0, 0, 4, 4));
            let c = Color {
                r: 0x60,
                g: 0x02,
                b: 0xee,
            };
            img.set(1, 2, c);
            assert_eq!(img.get(1, 2), c);
            assert_eq!(img.get(0, 0), BLACK);
        }
    }

    #[test]
    fn pixel_round_trip_respects_offset_origin() {
        let mut img = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(10, 20, 14, 24));
        img.set(10, 20, WHITE);
        img.set(13, 23, WHITE);
        assert_eq!(img.get(10, 20), WHITE);
        assert_eq!(img.get(13, 23), WHITE);
        assert_eq!(img.get(11, 20), BLACK);
    }

    #[test]
    fn byte_order_reverses_pixel_bytes() {
        let mut be = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(0, 0, 2, 1));
        let mut fmt = PixelFormat::rgba32();
        fmt.big_endian = false;
        let mut le = PixelFormatImage::new(fmt, Rect::new(0, 0, 2, 1));

        let c = Color {
            r: 0x11,
            g: 0x22,
            b: 0x33,
        };
        for img in [&mut be, &mut le] {
            img.set(0, 0, c);
            img.set(1, 0, c);
        }

        for x in 0..2 {
            let mut reversed: Vec<u8> = le.pixel_bytes()[x * 4..x * 4 + 4].to_vec();
            reversed.reverse();
            assert_eq!(&be.pixel_bytes()[x * 4..x * 4 + 4], &reversed[..]);
        }
        assert_eq!(be.get(0, 0), le.get(0, 0));
    }

    #[test]
    fn little_endian_packing_is_wire_visible() {
        let mut img = PixelFormatImage::new(little_endian_argb(), Rect::new(0, 0, 1, 1));
        img.set(
            0,
            0,
            Color {
                r: 0xaa,
                g: 0xbb,
                b: 0xcc,
            },
        );
        // Pixel 0x00aabbcc, little-endian: B, G, R, padding.
        assert_eq!(img.pixel_bytes(), &[0xcc, 0xbb, 0xaa, 0x00]);
    }

    #[test]
    fn fill_clips_to_bounds() {
        let mut img = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(0, 0, 4, 4));
        img.fill(Rect::new(2, 2, 100, 100), WHITE);
        assert_eq!(img.get(3, 3), WHITE);
        assert_eq!(img.get(1, 1), BLACK);

        // Filling a degenerate image is a no-op rather than a panic.
        let mut empty = PixelFormatImage::new(PixelFormat::rgba32(), Rect::ZERO);
        empty.fill(Rect::new(0, 0, 10, 10), WHITE);
    }

    #[test]
    fn draw_image_copies_and_clips() {
        let mut src = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(0, 0, 2, 2));
        src.fill(src.bounds(), WHITE);

        let mut dst = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(0, 0, 4, 4));
        dst.draw_image(Rect::new(3, 3, 5, 5), &src, pt(0, 0));
        assert_eq!(dst.get(3, 3), WHITE);
        assert_eq!(dst.get(2, 2), BLACK);
    }

    #[test]
    fn draw_image_converts_between_formats() {
        let mut src = PixelFormatImage::new(little_endian_argb(), Rect::new(0, 0, 1, 1));
        let c = Color {
            r: 1,
            g: 2,
            b: 3,
        };
        src.set(0, 0, c);

        let mut dst = PixelFormatImage::new(PixelFormat::rgba32(), Rect::new(0, 0, 1, 1));
        dst.draw_image(dst.bounds(), &src, pt(0, 0));
        assert_eq!(dst.get(0, 0), c);
    }

    #[test]
    #[should_panic(expected = "bits-per-pixel")]
    fn rejects_unsupported_depth() {
        let mut fmt = PixelFormat::rgba32();
        fmt.bits_per_pixel = 24;
        let mut img = PixelFormatImage::new(fmt, Rect::new(0, 0, 1, 1));
        img.set(0, 0, BLACK);
    }

    #[test]
    #[should_panic(expected = "must be 255")]
    fn rejects_narrow_channels() {
        let mut fmt = PixelFormat::rgba32();
        fmt.red_max = 31;
        let img = PixelFormatImage::new(fmt, Rect::new(0, 0, 1, 1));
        img.get(0, 0);
    }
}
