//! RFB wire records and their fixed-length codecs.
//!
//! Every record here has a constant encoded length; callers read exactly
//! that many bytes off the stream and decode with the matching
//! `from_bytes`. The message-type byte that precedes each record on the
//! wire is read separately by the session loops. Multi-byte fields are
//! network byte order.

use crate::rfb::error::RfbError;

/// `"RFB 003.003\n"`, the version the embedded client speaks.
pub const PROTOCOL_VERSION_33: &[u8; 12] = b"RFB 003.003\n";
/// `"RFB 003.008\n"`, the version the server advertises.
pub const PROTOCOL_VERSION_38: &[u8; 12] = b"RFB 003.008\n";

/// Encoded length of [`PixelFormat`].
pub const PIXEL_FORMAT_LEN: usize = 16;
/// Encoded length of [`FramebufferUpdateRequest`].
pub const UPDATE_REQUEST_LEN: usize = 9;
/// Encoded length of [`KeyEvent`].
pub const KEY_EVENT_LEN: usize = 7;
/// Encoded length of [`PointerEvent`].
pub const POINTER_EVENT_LEN: usize = 5;
/// Encoded length of [`RectHeader`].
pub const RECT_HEADER_LEN: usize = 12;

// Client-to-server message types.
pub const MSG_SET_PIXEL_FORMAT: u8 = 0;
pub const MSG_SET_ENCODINGS: u8 = 2;
pub const MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;
pub const MSG_KEY_EVENT: u8 = 4;
pub const MSG_POINTER_EVENT: u8 = 5;
pub const MSG_CLIENT_CUT_TEXT: u8 = 6;

// Server-to-client message types.
pub const MSG_FRAMEBUFFER_UPDATE: u8 = 0;
pub const MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;
pub const MSG_BELL: u8 = 2;
pub const MSG_SERVER_CUT_TEXT: u8 = 3;

/// The only supported rectangle encoding.
pub const ENCODING_RAW: i32 = 0;

/// Parse a 12-byte `"RFB xxx.yyy\n"` ProtocolVersion string.
pub fn parse_protocol_version(buf: &[u8; 12]) -> Result<(u32, u32), RfbError> {
    let malformed = || RfbError::MalformedVersion(buf.to_vec());
    if &buf[..4] != b"RFB " || buf[7] != b'.' || buf[11] != b'\n' {
        return Err(malformed());
    }
    let digits = |b: &[u8]| -> Result<u32, RfbError> {
        std::str::from_utf8(b)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(malformed)
    };
    Ok((digits(&buf[4..7])?, digits(&buf[8..11])?))
}

/// Runtime description of a pixel's byte layout: depth, endianness, and
/// per-channel mask and shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub bit_depth: u8,
    pub big_endian: bool,
    pub true_color: bool,

    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The canonical format the server advertises: RGBA packed into 32
    /// big-endian bits with 8 bits per channel.
    pub const fn rgba32() -> PixelFormat {
        PixelFormat {
            bits_per_pixel: 32,
            bit_depth: 24,
            big_endian: true,
            true_color: true,

            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 24,
            green_shift: 16,
            blue_shift: 8,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    pub fn from_bytes(buf: &[u8; PIXEL_FORMAT_LEN]) -> PixelFormat {
        PixelFormat {
            bits_per_pixel: buf[0],
            bit_depth: buf[1],
            big_endian: buf[2] != 0,
            true_color: buf[3] != 0,
            red_max: u16::from_be_bytes([buf[4], buf[5]]),
            green_max: u16::from_be_bytes([buf[6], buf[7]]),
            blue_max: u16::from_be_bytes([buf[8], buf[9]]),
            red_shift: buf[10],
            green_shift: buf[11],
            blue_shift: buf[12],
            // buf[13..16] is padding
        }
    }

    pub fn to_bytes(&self) -> [u8; PIXEL_FORMAT_LEN] {
        let mut buf = [0u8; PIXEL_FORMAT_LEN];
        buf[0] = self.bits_per_pixel;
        buf[1] = self.bit_depth;
        buf[2] = self.big_endian as u8;
        buf[3] = self.true_color as u8;
        buf[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        buf[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        buf[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        buf[10] = self.red_shift;
        buf[11] = self.green_shift;
        buf[12] = self.blue_shift;
        buf
    }

    /// Check that a peer-supplied format is one this implementation can
    /// actually encode into: whole bytes, true colour, 255 per channel,
    /// and channels that don't overlap once shifted.
    ///
    /// Sessions call this before adopting a format, so the panics in the
    /// image model stay out of reach of remote input.
    pub fn validate(&self) -> Result<(), RfbError> {
        let unsupported = |detail: String| Err(RfbError::UnsupportedPixelFormat(detail));

        if !self.true_color {
            return unsupported("indexed colour is not supported".into());
        }
        if !matches!(self.bits_per_pixel, 8 | 16 | 32) {
            return unsupported(format!(
                "bits-per-pixel must be 8, 16, or 32, but it's {}",
                self.bits_per_pixel
            ));
        }
        if self.red_max != 255 || self.green_max != 255 || self.blue_max != 255 {
            return unsupported(format!(
                "max red, green, and blue must be 255, but are {}, {}, and {}",
                self.red_max, self.green_max, self.blue_max
            ));
        }
        let masks = [
            (self.red_max as u64) << self.red_shift,
            (self.green_max as u64) << self.green_shift,
            (self.blue_max as u64) << self.blue_shift,
        ];
        let pixel_bits = 1u64
            .checked_shl(self.bits_per_pixel as u32)
            .map(|b| b - 1)
            .unwrap_or(u64::MAX);
        for (mask, name) in masks.iter().zip(["red", "green", "blue"]) {
            if *mask > pixel_bits {
                return unsupported(format!("{name} channel doesn't fit in the pixel"));
            }
        }
        if masks[0] & masks[1] != 0 || masks[0] & masks[2] != 0 || masks[1] & masks[2] != 0 {
            return unsupported("channels overlap".into());
        }
        Ok(())
    }
}

/// A client's request for a repaint of a subrectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramebufferUpdateRequest {
    pub incremental: bool,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl FramebufferUpdateRequest {
    pub fn from_bytes(buf: &[u8; UPDATE_REQUEST_LEN]) -> FramebufferUpdateRequest {
        FramebufferUpdateRequest {
            incremental: buf[0] != 0,
            x: u16::from_be_bytes([buf[1], buf[2]]),
            y: u16::from_be_bytes([buf[3], buf[4]]),
            width: u16::from_be_bytes([buf[5], buf[6]]),
            height: u16::from_be_bytes([buf[7], buf[8]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; UPDATE_REQUEST_LEN] {
        let mut buf = [0u8; UPDATE_REQUEST_LEN];
        buf[0] = self.incremental as u8;
        buf[1..3].copy_from_slice(&self.x.to_be_bytes());
        buf[3..5].copy_from_slice(&self.y.to_be_bytes());
        buf[5..7].copy_from_slice(&self.width.to_be_bytes());
        buf[7..9].copy_from_slice(&self.height.to_be_bytes());
        buf
    }
}

/// A key press or release, with its X11 keysym.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyEvent {
    pub pressed: bool,
    pub keysym: u32,
}

impl KeyEvent {
    pub fn from_bytes(buf: &[u8; KEY_EVENT_LEN]) -> KeyEvent {
        KeyEvent {
            pressed: buf[0] != 0,
            // buf[1..3] is padding
            keysym: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; KEY_EVENT_LEN] {
        let mut buf = [0u8; KEY_EVENT_LEN];
        buf[0] = self.pressed as u8;
        buf[3..7].copy_from_slice(&self.keysym.to_be_bytes());
        buf
    }
}

/// The pointer position and button state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerEvent {
    pub button_mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub fn from_bytes(buf: &[u8; POINTER_EVENT_LEN]) -> PointerEvent {
        PointerEvent {
            button_mask: buf[0],
            x: u16::from_be_bytes([buf[1], buf[2]]),
            y: u16::from_be_bytes([buf[3], buf[4]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; POINTER_EVENT_LEN] {
        let mut buf = [0u8; POINTER_EVENT_LEN];
        buf[0] = self.button_mask;
        buf[1..3].copy_from_slice(&self.x.to_be_bytes());
        buf[3..5].copy_from_slice(&self.y.to_be_bytes());
        buf
    }
}

/// Header of one rectangle inside a FramebufferUpdate; the raw pixel
/// payload of `bytes_per_pixel * width * height` bytes follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl RectHeader {
    pub fn from_bytes(buf: &[u8; RECT_HEADER_LEN]) -> RectHeader {
        RectHeader {
            x: u16::from_be_bytes([buf[0], buf[1]]),
            y: u16::from_be_bytes([buf[2], buf[3]]),
            width: u16::from_be_bytes([buf[4], buf[5]]),
            height: u16::from_be_bytes([buf[6], buf[7]]),
            encoding: i32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; RECT_HEADER_LEN] {
        let mut buf = [0u8; RECT_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.x.to_be_bytes());
        buf[2..4].copy_from_slice(&self.y.to_be_bytes());
        buf[4..6].copy_from_slice(&self.width.to_be_bytes());
        buf[6..8].copy_from_slice(&self.height.to_be_bytes());
        buf[8..12].copy_from_slice(&self.encoding.to_be_bytes());
        buf
    }
}
