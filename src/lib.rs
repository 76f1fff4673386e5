//! dirgui exposes a directory as a live GUI over the RFB (VNC) protocol.
//!
//! Every regular file in the served directory becomes one row of
//! widgets: plain files get a line editor with Load and Save buttons,
//! executables get a Run button, and a file `X` with a sibling `X.gui`
//! gets that companion launched as a child RFB server whose framebuffer
//! is composited into the parent's window. Any RFB viewer can connect.
//!
//! # Modules
//!
//! - `rfb`: protocol codecs, the pixel-format image model, and the
//!   server/client session state machines.
//! - `ui`: the immediate-mode painter, its widgets, and the bridge that
//!   embeds companion GUIs.
//! - `geom`: the points and rectangles everything above shares.

pub mod geom;
pub mod rfb;
pub mod ui;
