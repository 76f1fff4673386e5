//! Click-on-release push buttons.

use crate::geom::{pt, Rect};
use crate::rfb::image::{Color, PixelFormatImage, BLACK, WHITE};
use crate::rfb::protocol::PointerEvent;
use crate::ui::text::draw_text;

pub const PRIMARY: Color = Color {
    r: 0x60,
    g: 0x02,
    b: 0xee,
};
pub const PRIMARY_LIGHT: Color = Color {
    r: 0x99,
    g: 0x46,
    b: 0xff,
};

/// Arming state a button keeps between frames.
#[derive(Debug, Default)]
pub struct ButtonState {
    armed: bool,
}

impl ButtonState {
    /// Advance the state machine one frame. Returns true when button 1
    /// was released while hovering, i.e. on a click.
    // TODO: Require that the click started on the button.
    pub fn update(&mut self, hovering: bool, down: bool) -> bool {
        if self.armed {
            if !down {
                self.armed = false;
                return hovering;
            }
        } else if hovering && down {
            self.armed = true;
        }
        false
    }
}

/// Draw a button and run its state machine against the pointer snapshot.
/// Returns true on a click.
pub fn button(
    state: &mut ButtonState,
    caption: &str,
    rect: Rect,
    img: &mut PixelFormatImage,
    pointer: &PointerEvent,
) -> bool {
    let hovering = rect.contains(pt(pointer.x as i32, pointer.y as i32));
    let down = pointer.button_mask & 1 != 0;
    let clicked = state.update(hovering, down);

    let fill = if hovering {
        if down {
            BLACK
        } else {
            PRIMARY_LIGHT
        }
    } else {
        PRIMARY
    };
    img.fill(rect, fill);
    draw_text(
        img,
        pt(rect.min.x + 8, rect.max.y - 16),
        caption,
        WHITE,
    );

    clicked
}
