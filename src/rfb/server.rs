//! The per-connection RFB server session and the accept loop.
//!
//! A session walks the handshake (ProtocolVersion, security,
//! ClientInit/ServerInit) and then pumps client messages until the peer
//! goes away or violates the protocol. Painting is not done here: every
//! repaint is posted to the painter task through a [`PaintHandle`], which
//! serialises all UI state behind one task no matter how many viewers
//! are connected.

use bytes::{BufMut, BytesMut};
use log::{debug, error, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

use crate::geom::{pt, Rect};
use crate::rfb::error::RfbError;
use crate::rfb::image::PixelFormatImage;
use crate::rfb::protocol::{
    self, FramebufferUpdateRequest, KeyEvent, PixelFormat, PointerEvent, RectHeader,
};

/// Longest ClientCutText a session will read; the text is only logged.
const MAX_CUT_TEXT_LEN: u32 = 256;

/// How a session authenticates an RFB 3.3 client. 3.8 clients always get
/// security type None.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacySecurity {
    /// Security type 2 with a throwaway challenge whose response is
    /// accepted unconditionally. Insecure, demo-only: it exists because
    /// some viewers refuse servers that offer no authentication at all.
    VncAuth,
    /// Security type 1, no challenge.
    None,
}

/// Per-server configuration shared by every session.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Desktop name sent in ServerInit.
    pub name: String,
    pub legacy_security: LegacySecurity,
}

/// One repaint posted to the painter task.
///
/// `rect` is the target subrectangle in window coordinates; an empty
/// rect asks for input side effects only. The reply carries the painted
/// image together with the full window rectangle.
#[derive(Debug)]
pub struct PaintRequest {
    pub rect: Rect,
    pub key: KeyEvent,
    pub pointer: PointerEvent,
    pub format: PixelFormat,
    pub reply: oneshot::Sender<(PixelFormatImage, Rect)>,
}

/// Cloneable handle sessions use to request paints from the painter task.
#[derive(Debug, Clone)]
pub struct PaintHandle {
    tx: mpsc::Sender<PaintRequest>,
}

impl PaintHandle {
    pub fn new(tx: mpsc::Sender<PaintRequest>) -> PaintHandle {
        PaintHandle { tx }
    }

    /// Paint `rect` with the given input snapshot, returning the painted
    /// image and the full window rectangle.
    pub async fn paint(
        &self,
        rect: Rect,
        key: KeyEvent,
        pointer: PointerEvent,
        format: PixelFormat,
    ) -> Result<(PixelFormatImage, Rect), RfbError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(PaintRequest {
                rect,
                key,
                pointer,
                format,
                reply,
            })
            .await
            .map_err(|_| RfbError::PainterClosed)?;
        response.await.map_err(|_| RfbError::PainterClosed)
    }
}

/// Accept viewers forever, running an independent session per connection.
/// Returns only if `accept` itself fails.
pub async fn listen(
    listener: TcpListener,
    opts: ServerOptions,
    painter: PaintHandle,
) -> Result<(), RfbError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("accepted connection from {peer}");
        let opts = opts.clone();
        let painter = painter.clone();
        tokio::spawn(async move {
            if let Err(err) = serve(stream, opts, painter).await {
                error!("session with {peer} failed: {err}");
            }
        });
    }
}

/// Run one RFB server session over `stream` until error or disconnect.
pub async fn serve<S>(
    mut stream: S,
    opts: ServerOptions,
    painter: PaintHandle,
) -> Result<(), RfbError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut format = PixelFormat::rgba32();
    let mut key = KeyEvent::default();
    let mut pointer = PointerEvent::default();

    stream.write_all(protocol::PROTOCOL_VERSION_38).await?;

    let mut version = [0u8; 12];
    stream.read_exact(&mut version).await?;
    let (major, minor) = protocol::parse_protocol_version(&version)?;
    debug!("client requests protocol version {major}.{minor}");

    match (major, minor) {
        (3, 3) => match opts.legacy_security {
            LegacySecurity::VncAuth => {
                // Security type 2 plus a 16-byte challenge in one write;
                // the response is read and thrown away.
                let mut scheme = [0u8; 20];
                scheme[..4].copy_from_slice(&2u32.to_be_bytes());
                stream.write_all(&scheme).await?;

                let mut response = [0u8; 16];
                stream.read_exact(&mut response).await?;

                stream.write_all(&0u32.to_be_bytes()).await?;
            }
            LegacySecurity::None => {
                stream.write_all(&1u32.to_be_bytes()).await?;
            }
        },
        (3, 8) => {
            // One supported security type: None.
            stream.write_all(&[1, 1]).await?;

            let mut chosen = [0u8; 1];
            stream.read_exact(&mut chosen).await?;
            if chosen[0] != 1 {
                return Err(RfbError::UnsupportedSecurityType(chosen[0] as u32));
            }

            stream.write_all(&[0]).await?;
        }
        (major, minor) => return Err(RfbError::UnsupportedVersion { major, minor }),
    }

    let mut shared = [0u8; 1];
    stream.read_exact(&mut shared).await?;
    if shared[0] == 0 {
        debug!("client requests other clients be disconnected");
    } else {
        debug!("client requests other clients remain connected");
    }

    // Dummy paint to discover the window size.
    let (_, window) = painter.paint(Rect::ZERO, key, pointer, format).await?;
    assert_eq!(
        window.min,
        pt(0, 0),
        "window origin must be (0, 0), but it's {:?}",
        window.min
    );

    let mut init = BytesMut::with_capacity(24 + opts.name.len());
    init.put_u16(window.dx() as u16);
    init.put_u16(window.dy() as u16);
    init.put_slice(&format.to_bytes());
    init.put_u32(opts.name.len() as u32);
    init.put_slice(opts.name.as_bytes());
    stream.write_all(&init).await?;
    stream.flush().await?;

    loop {
        let mut msg_type = [0u8; 1];
        stream.read_exact(&mut msg_type).await?;
        match msg_type[0] {
            protocol::MSG_SET_PIXEL_FORMAT => {
                let mut buf = [0u8; 3 + protocol::PIXEL_FORMAT_LEN];
                stream.read_exact(&mut buf).await?;
                let requested = PixelFormat::from_bytes(buf[3..].try_into().unwrap());
                requested.validate()?;
                info!("client requested pixel format: {requested:?}");
                format = requested;
            }

            protocol::MSG_SET_ENCODINGS => {
                let mut head = [0u8; 3];
                stream.read_exact(&mut head).await?;
                let count = u16::from_be_bytes([head[1], head[2]]);
                let mut list = vec![0u8; 4 * count as usize];
                stream.read_exact(&mut list).await?;
                let encodings: Vec<i32> = list
                    .chunks_exact(4)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                // Only Raw is offered, so the preference list is moot.
                debug!("client requested one of {count} encodings: {encodings:?}");
            }

            protocol::MSG_FRAMEBUFFER_UPDATE_REQUEST => {
                let mut buf = [0u8; protocol::UPDATE_REQUEST_LEN];
                stream.read_exact(&mut buf).await?;
                let req = FramebufferUpdateRequest::from_bytes(&buf);

                let rect = Rect::new(
                    req.x as i32,
                    req.y as i32,
                    req.x as i32 + req.width as i32,
                    req.y as i32 + req.height as i32,
                );
                let (img, _) = painter.paint(rect, key, pointer, format).await?;

                let header = RectHeader {
                    x: req.x,
                    y: req.y,
                    width: req.width,
                    height: req.height,
                    encoding: protocol::ENCODING_RAW,
                };
                let mut update =
                    BytesMut::with_capacity(4 + protocol::RECT_HEADER_LEN + img.pixel_bytes().len());
                update.put_u8(protocol::MSG_FRAMEBUFFER_UPDATE);
                update.put_u8(0); // padding
                update.put_u16(1); // rectangle count
                update.put_slice(&header.to_bytes());
                update.put_slice(img.pixel_bytes());
                // One burst so a slow peer never sees a partial frame.
                stream.write_all(&update).await?;
                stream.flush().await?;
            }

            protocol::MSG_KEY_EVENT => {
                let mut buf = [0u8; protocol::KEY_EVENT_LEN];
                stream.read_exact(&mut buf).await?;
                key = KeyEvent::from_bytes(&buf);
                // Throwaway paint so button and editor transitions land
                // before the next update request.
                painter.paint(Rect::ZERO, key, pointer, format).await?;
            }

            protocol::MSG_POINTER_EVENT => {
                let mut buf = [0u8; protocol::POINTER_EVENT_LEN];
                stream.read_exact(&mut buf).await?;
                pointer = PointerEvent::from_bytes(&buf);
                painter.paint(Rect::ZERO, key, pointer, format).await?;
            }

            protocol::MSG_CLIENT_CUT_TEXT => {
                let mut head = [0u8; 7];
                stream.read_exact(&mut head).await?;
                let length = u32::from_be_bytes([head[3], head[4], head[5], head[6]]);
                // The length field is client-controlled; never allocate
                // for it unchecked.
                if length > MAX_CUT_TEXT_LEN {
                    return Err(RfbError::CutTextTooLong {
                        got: length,
                        limit: MAX_CUT_TEXT_LEN,
                    });
                }
                let mut raw = vec![0u8; length as usize];
                stream.read_exact(&mut raw).await?;
                let text: String = raw.iter().map(|&b| b as char).collect();
                info!("client copied text: {text:?}");
            }

            other => return Err(RfbError::UnknownMessage(other)),
        }
    }
}
