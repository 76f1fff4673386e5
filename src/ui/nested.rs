//! The bridge that embeds a companion GUI's framebuffer in the parent.
//!
//! For a file `X` with a sibling `X.gui`, the bridge binds an ephemeral
//! loopback listener, launches `X.gui` pointed back at it, and drives the
//! child's RFB server with the embedded client. Received frames land in
//! a mutex-guarded latest-value slot the painter reads; the child is
//! killed as soon as the client session ends for any reason.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::geom::Point;
use crate::rfb::client;
use crate::rfb::error::RfbError;
use crate::rfb::image::PixelFormatImage;

/// Latest frame published by a nested client, swapped under a lock.
pub type FrameSlot = Arc<Mutex<Option<PixelFormatImage>>>;

/// A running companion GUI: its panel size and its latest frame.
#[derive(Debug)]
pub struct NestedGui {
    pub size: Point,
    pub frame: FrameSlot,
}

/// Launch `gui_name` from `dir` against an ephemeral listener and drive
/// it in the background. Returns once the child has reported its bounds.
pub async fn launch(dir: &Path, gui_name: &str, target_name: &str) -> Result<NestedGui, RfbError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    info!("starting subprocess {gui_name} at {addr}");
    let mut child = Command::new(dir.join(gui_name))
        .arg("--parent-vnc-addr")
        .arg(addr.to_string())
        .arg(target_name)
        .current_dir(dir)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    debug!("waiting for subprocess connection");
    let (conn, _) = listener.accept().await?;

    let (bounds_tx, bounds_rx) = oneshot::channel();
    let frame: FrameSlot = Arc::new(Mutex::new(None));

    let slot = frame.clone();
    tokio::spawn(async move {
        let mut bounds_tx = Some(bounds_tx);
        let result = client::run(
            conn,
            move |rect| {
                if let Some(tx) = bounds_tx.take() {
                    let _ = tx.send(rect);
                }
            },
            move |fb| {
                let copy = fb.clone();
                *slot.lock().unwrap() = Some(copy);
            },
        )
        .await;
        if let Err(err) = result {
            warn!("nested gui client failed: {err}");
        }
        if let Err(err) = child.kill().await {
            warn!("couldn't kill subprocess: {err}");
        }
    });

    let bounds = bounds_rx.await.map_err(|_| RfbError::NestedGuiClosed)?;
    Ok(NestedGui {
        size: Point {
            x: bounds.dx(),
            y: bounds.dy(),
        },
        frame,
    })
}
