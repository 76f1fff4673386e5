//! Remote Framebuffer (RFB) protocol plumbing.
//!
//! This module carries both halves of the protocol:
//!
//! - **`protocol`**: wire records and their fixed-length codecs
//! - **`image`**: the pixel-format-governed framebuffer image
//! - **`server`**: the per-viewer session state machine and accept loop
//! - **`client`**: the embedded client that drives companion GUIs
//! - **`error`**: the error taxonomy sessions close with
//!
//! Versions 3.3 and 3.8 are spoken on the server side; the client side
//! sticks to 3.3. Raw is the only rectangle encoding.

pub mod client;
pub mod error;
pub mod image;
pub mod protocol;
pub mod server;

pub use error::RfbError;
pub use image::PixelFormatImage;
pub use protocol::PixelFormat;
