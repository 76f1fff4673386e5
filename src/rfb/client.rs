//! The embedded RFB client that drives a child server.
//!
//! Speaks RFB 3.3 only, since every server supports it. Each received
//! rectangle is blitted into a persistent composite framebuffer, the
//! frame callback fires, and another full-frame incremental request goes
//! out immediately so the child never idles waiting on us.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::geom::Rect;
use crate::rfb::error::RfbError;
use crate::rfb::image::PixelFormatImage;
use crate::rfb::protocol::{
    self, FramebufferUpdateRequest, PixelFormat, RectHeader,
};

/// Longest ServerInit name this client will read.
const MAX_NAME_LEN: u32 = 256;

/// Run an RFB 3.3 client session over `stream`.
///
/// `on_bounds` fires once with the server's window rectangle before any
/// frame arrives. `on_frame` fires with the composite framebuffer after
/// every received rectangle; the reference must not be retained past the
/// call.
pub async fn run<S, F, G>(
    mut stream: S,
    mut on_bounds: F,
    mut on_frame: G,
) -> Result<(), RfbError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(Rect),
    G: FnMut(&PixelFormatImage),
{
    let mut version = [0u8; 12];
    stream.read_exact(&mut version).await?;
    // Disregard the advertised version; every server speaks 3.3.
    stream.write_all(protocol::PROTOCOL_VERSION_33).await?;

    let mut scheme = [0u8; 4];
    stream.read_exact(&mut scheme).await?;
    let scheme = u32::from_be_bytes(scheme);
    if scheme != 1 {
        return Err(RfbError::UnsupportedSecurityType(scheme));
    }

    // ClientInit: share the desktop with other clients.
    stream.write_all(&[1]).await?;

    let mut init = [0u8; 4 + protocol::PIXEL_FORMAT_LEN + 4];
    stream.read_exact(&mut init).await?;
    let width = u16::from_be_bytes([init[0], init[1]]);
    let height = u16::from_be_bytes([init[2], init[3]]);
    let format = PixelFormat::from_bytes(init[4..20].try_into().unwrap());
    format.validate()?;
    let name_len = u32::from_be_bytes([init[20], init[21], init[22], init[23]]);
    if name_len > MAX_NAME_LEN {
        return Err(RfbError::NameTooLong {
            got: name_len,
            limit: MAX_NAME_LEN,
        });
    }
    let mut name = vec![0u8; name_len as usize];
    stream.read_exact(&mut name).await?;
    debug!(
        "connected to {:?}, {width}x{height}",
        String::from_utf8_lossy(&name)
    );

    let bounds = Rect::new(0, 0, width as i32, height as i32);
    on_bounds(bounds);

    let mut framebuffer = PixelFormatImage::new(format, bounds);
    let request = FramebufferUpdateRequest {
        incremental: true,
        x: 0,
        y: 0,
        width,
        height,
    };
    let mut request_msg = [0u8; 1 + protocol::UPDATE_REQUEST_LEN];
    request_msg[0] = protocol::MSG_FRAMEBUFFER_UPDATE_REQUEST;
    request_msg[1..].copy_from_slice(&request.to_bytes());
    stream.write_all(&request_msg).await?;

    loop {
        let mut msg_type = [0u8; 1];
        stream.read_exact(&mut msg_type).await?;
        match msg_type[0] {
            protocol::MSG_FRAMEBUFFER_UPDATE => {
                let mut head = [0u8; 3];
                stream.read_exact(&mut head).await?;
                let rect_count = u16::from_be_bytes([head[1], head[2]]);
                for _ in 0..rect_count {
                    let mut header = [0u8; protocol::RECT_HEADER_LEN];
                    stream.read_exact(&mut header).await?;
                    let header = RectHeader::from_bytes(&header);
                    if header.encoding != protocol::ENCODING_RAW {
                        return Err(RfbError::UnsupportedEncoding(header.encoding));
                    }

                    let len = format.bytes_per_pixel()
                        * header.width as usize
                        * header.height as usize;
                    let mut payload = vec![0u8; len];
                    stream.read_exact(&mut payload).await?;

                    let rect = Rect::new(
                        header.x as i32,
                        header.y as i32,
                        header.x as i32 + header.width as i32,
                        header.y as i32 + header.height as i32,
                    );
                    let patch = PixelFormatImage::from_pixel_bytes(format, rect, payload);
                    framebuffer.draw_image(rect, &patch, rect.min);
                    on_frame(&framebuffer);

                    // Keep the request pipeline primed.
                    stream.write_all(&request_msg).await?;
                }
            }

            protocol::MSG_SET_COLOUR_MAP_ENTRIES => return Err(RfbError::ColourMapUnsupported),

            protocol::MSG_BELL => {}

            protocol::MSG_SERVER_CUT_TEXT => {
                let mut head = [0u8; 7];
                stream.read_exact(&mut head).await?;
                let length = u32::from_be_bytes([head[3], head[4], head[5], head[6]]);
                // Not supported, so throw it away; the length is
                // server-controlled, so drain in bounded chunks rather
                // than allocating for it.
                let mut remaining = length as usize;
                let mut chunk = [0u8; 4096];
                while remaining > 0 {
                    let n = remaining.min(chunk.len());
                    stream.read_exact(&mut chunk[..n]).await?;
                    remaining -= n;
                }
            }

            other => return Err(RfbError::UnknownMessage(other)),
        }
    }
}
