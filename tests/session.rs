//! End-to-end session tests: a real painter task over a real directory,
//! driven through both ends of an in-memory stream.

use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use dirgui::geom::Rect;
use dirgui::rfb::image::{PixelFormatImage, WHITE};
use dirgui::rfb::protocol::{
    FramebufferUpdateRequest, KeyEvent, PixelFormat, PointerEvent, RectHeader,
    MSG_FRAMEBUFFER_UPDATE_REQUEST, MSG_KEY_EVENT, MSG_POINTER_EVENT,
};
use dirgui::rfb::server::{serve, LegacySecurity, PaintHandle, ServerOptions};
use dirgui::rfb::{client, RfbError};
use dirgui::ui::Ui;

async fn start_session(dir: &TempDir, security: LegacySecurity) -> DuplexStream {
    let ui = Ui::scan(dir.path()).await.unwrap();
    let painter: PaintHandle = ui.start();
    let opts = ServerOptions {
        name: "dirgui".into(),
        legacy_security: security,
    };
    let (viewer, server_end) = tokio::io::duplex(4 * 1024 * 1024);
    tokio::spawn(async move {
        if let Err(err) = serve(server_end, opts, painter).await {
            // Sessions end with an I/O error when the viewer hangs up.
            assert!(matches!(err, RfbError::Io(_)), "unexpected error: {err}");
        }
    });
    viewer
}

async fn read_exactly(stream: &mut DuplexStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Drive the 3.3 handshake from the viewer side and return (width,
/// height) from ServerInit.
async fn handshake_33(viewer: &mut DuplexStream) -> (u16, u16) {
    assert_eq!(read_exactly(viewer, 12).await, b"RFB 003.008\n");
    viewer.write_all(b"RFB 003.003\n").await.unwrap();

    let scheme = read_exactly(viewer, 20).await;
    assert_eq!(&scheme[..4], &2u32.to_be_bytes());
    viewer.write_all(&[0u8; 16]).await.unwrap();
    assert_eq!(read_exactly(viewer, 4).await, 0u32.to_be_bytes());

    viewer.write_all(&[1]).await.unwrap();

    let init = read_exactly(viewer, 24).await;
    let width = u16::from_be_bytes([init[0], init[1]]);
    let height = u16::from_be_bytes([init[2], init[3]]);
    assert_eq!(&init[4..20], &PixelFormat::rgba32().to_bytes());
    let name_len = u32::from_be_bytes([init[20], init[21], init[22], init[23]]);
    assert_eq!(read_exactly(viewer, name_len as usize).await, b"dirgui");
    (width, height)
}

async fn request_update(viewer: &mut DuplexStream, x: u16, y: u16, width: u16, height: u16) {
    let req = FramebufferUpdateRequest {
        incremental: false,
        x,
        y,
        width,
        height,
    };
    viewer
        .write_all(&[MSG_FRAMEBUFFER_UPDATE_REQUEST])
        .await
        .unwrap();
    viewer.write_all(&req.to_bytes()).await.unwrap();
}

/// Read one FramebufferUpdate and return its single rectangle as an
/// image in the canonical format.
async fn read_update(viewer: &mut DuplexStream) -> PixelFormatImage {
    let head = read_exactly(viewer, 4).await;
    assert_eq!(head[0], 0, "expected FramebufferUpdate");
    assert_eq!(u16::from_be_bytes([head[2], head[3]]), 1);

    let header = RectHeader::from_bytes(&read_exactly(viewer, 12).await.try_into().unwrap());
    assert_eq!(header.encoding, 0);
    let len = 4 * header.width as usize * header.height as usize;
    let payload = read_exactly(viewer, len).await;
    PixelFormatImage::from_pixel_bytes(
        PixelFormat::rgba32(),
        Rect::new(
            header.x as i32,
            header.y as i32,
            header.x as i32 + header.width as i32,
            header.y as i32 + header.height as i32,
        ),
        payload,
    )
}

async fn send_pointer(viewer: &mut DuplexStream, x: u16, y: u16, button_mask: u8) {
    let event = PointerEvent { button_mask, x, y };
    viewer.write_all(&[MSG_POINTER_EVENT]).await.unwrap();
    viewer.write_all(&event.to_bytes()).await.unwrap();
}

async fn send_key(viewer: &mut DuplexStream, keysym: u32, pressed: bool) {
    let event = KeyEvent { pressed, keysym };
    viewer.write_all(&[MSG_KEY_EVENT]).await.unwrap();
    viewer.write_all(&event.to_bytes()).await.unwrap();
}

/// Write a one-frame solid purple GIF.
fn write_solid_gif(path: &std::path::Path, width: u16, height: u16) {
    let mut pixels = Vec::with_capacity(3 * width as usize * height as usize);
    for _ in 0..(width as usize * height as usize) {
        pixels.extend_from_slice(&[0x60, 0x02, 0xee]);
    }
    let mut file = std::fs::File::create(path).unwrap();
    let mut encoder = gif::Encoder::new(&mut file, width, height, &[]).unwrap();
    let frame = gif::Frame::from_rgb(width, height, &pixels);
    encoder.write_frame(&frame).unwrap();
}

fn make_executable(path: &std::path::Path) {
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

async fn wait_for_file(path: &std::path::Path, contents: &str) {
    for _ in 0..500 {
        if let Ok(found) = std::fs::read_to_string(path) {
            if found == contents {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{path:?} never reached {contents:?}");
}

#[tokio::test]
async fn empty_directory_over_rfb_3_3() {
    let dir = tempdir().unwrap();
    let mut viewer = start_session(&dir, LegacySecurity::VncAuth).await;

    let (width, height) = handshake_33(&mut viewer).await;
    assert_eq!((width, height), (320, 8));

    request_update(&mut viewer, 0, 0, 320, 8).await;
    let img = read_update(&mut viewer).await;
    assert_eq!(img.bounds(), Rect::new(0, 0, 320, 8));
    for x in 0..320 {
        for y in 0..8 {
            assert_eq!(img.get(x, y), WHITE);
        }
    }
}

#[tokio::test]
async fn executable_click_runs_it_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hello");
    std::fs::write(&path, "#!/bin/sh\necho ran >> runs.log\n").unwrap();
    make_executable(&path);

    let mut viewer = start_session(&dir, LegacySecurity::VncAuth).await;
    let (width, height) = handshake_33(&mut viewer).await;
    assert_eq!((width, height), (320, 40));

    send_pointer(&mut viewer, 120, 20, 1).await;
    send_pointer(&mut viewer, 120, 20, 0).await;
    request_update(&mut viewer, 0, 0, 320, 32).await;
    let img = read_update(&mut viewer).await;

    // Still hovering after release, so the button band is highlighted.
    assert_eq!(
        img.get(9, 9),
        dirgui::ui::button::PRIMARY_LIGHT,
        "button band should be hovered"
    );

    wait_for_file(&dir.path().join("runs.log"), "ran\n").await;
}

#[tokio::test]
async fn typing_then_save_round_trips_through_the_wire() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("note");
    std::fs::write(&path, "old\n").unwrap();

    let mut viewer = start_session(&dir, LegacySecurity::VncAuth).await;
    let (_, height) = handshake_33(&mut viewer).await;
    assert_eq!(height, 56);

    // Hover the editor (x 8..184, y 24..48) and type "hi".
    send_pointer(&mut viewer, 100, 30, 0).await;
    send_key(&mut viewer, b'h' as u32, true).await;
    send_key(&mut viewer, b'h' as u32, false).await;
    send_key(&mut viewer, b'i' as u32, true).await;
    send_key(&mut viewer, b'i' as u32, false).await;

    // Click Save (x 256..312, y 24..48).
    send_pointer(&mut viewer, 260, 30, 1).await;
    send_pointer(&mut viewer, 260, 30, 0).await;

    // A trailing update request makes sure all events were consumed.
    request_update(&mut viewer, 0, 0, 320, 56).await;
    read_update(&mut viewer).await;

    wait_for_file(&path, "hi").await;
}

#[tokio::test]
async fn nested_gui_bounds_discovery() {
    let dir = tempdir().unwrap();
    // `track` is a 100x50 GIF and `track.gui` is the dirgui-gif binary,
    // so the companion renders `track` itself.
    write_solid_gif(&dir.path().join("track"), 100, 50);
    std::fs::copy(env!("CARGO_BIN_EXE_dirgui-gif"), dir.path().join("track.gui")).unwrap();
    make_executable(&dir.path().join("track.gui"));

    let mut viewer = start_session(&dir, LegacySecurity::VncAuth).await;
    let (width, height) = handshake_33(&mut viewer).await;
    // 8 top + 16 label + 50 panel + 8 + 8 = 90: the window grew to fit
    // the panel.
    assert_eq!((width, height), (320, 90));

    // The panel sits at (8, 24); repaint until a nested frame lands.
    for _ in 0..500 {
        request_update(&mut viewer, 8, 24, 100, 50).await;
        let img = read_update(&mut viewer).await;
        let non_white = (24..74).any(|y| (8..108).any(|x| img.get(x, y) != WHITE));
        if non_white {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("nested frame never appeared in the parent window");
}

#[tokio::test]
async fn embedded_client_drives_the_server() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("note"), "first line\n").unwrap();

    let ui = Ui::scan(dir.path()).await.unwrap();
    let painter = ui.start();
    let opts = ServerOptions {
        name: "dirgui".into(),
        legacy_security: LegacySecurity::None,
    };
    let (client_end, server_end) = tokio::io::duplex(4 * 1024 * 1024);
    tokio::spawn(async move {
        let _ = serve(server_end, opts, painter).await;
    });

    let (bounds_tx, bounds_rx) = tokio::sync::oneshot::channel();
    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        let mut bounds_tx = Some(bounds_tx);
        let _ = client::run(
            client_end,
            move |rect| {
                if let Some(tx) = bounds_tx.take() {
                    let _ = tx.send(rect);
                }
            },
            move |fb: &PixelFormatImage| {
                let _ = frame_tx.try_send(fb.get(0, 0));
            },
        )
        .await;
    });

    assert_eq!(bounds_rx.await.unwrap(), Rect::new(0, 0, 320, 56));
    let corner = frame_rx.recv().await.unwrap();
    assert_eq!(corner, WHITE);
}
