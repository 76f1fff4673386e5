//! A one-line text editor driven by raw keysyms.

use crate::geom::{pt, Rect};
use crate::rfb::image::{PixelFormatImage, BLACK, WHITE};
use crate::rfb::protocol::{KeyEvent, PointerEvent};
use crate::ui::text::draw_text;

const KEYSYM_BACKSPACE: u32 = 0xff08;

/// Keysym latch an editor keeps between frames so a held key doesn't
/// autorepeat into the buffer.
#[derive(Debug, Default)]
pub struct EditorState {
    last_keysym: u32,
}

impl EditorState {
    /// Apply one key snapshot to `buffer`. Printable ASCII appends,
    /// backspace drops the last byte, and everything else is ignored.
    pub fn apply(&mut self, buffer: &mut String, hovering: bool, key: &KeyEvent) {
        if !hovering {
            return;
        }
        if key.pressed {
            if self.last_keysym != key.keysym {
                if (0x20..=0x7e).contains(&key.keysym) {
                    buffer.push(key.keysym as u8 as char);
                } else if key.keysym == KEYSYM_BACKSPACE {
                    buffer.pop();
                }
            }
            self.last_keysym = key.keysym;
        } else {
            self.last_keysym = 0;
        }
    }
}

/// Draw the editor (black border, white field, current text) and feed it
/// the key snapshot when the pointer is over it.
pub fn edit(
    state: &mut EditorState,
    buffer: &mut String,
    rect: Rect,
    img: &mut PixelFormatImage,
    key: &KeyEvent,
    pointer: &PointerEvent,
) {
    img.fill(rect, BLACK);
    img.fill(rect.inset(1), WHITE);

    let hovering = rect.contains(pt(pointer.x as i32, pointer.y as i32));
    state.apply(buffer, hovering, key);

    draw_text(img, pt(rect.min.x + 8, rect.max.y - 16), buffer, BLACK);
}
