//! Companion GUI that plays an animated GIF.
//!
//! Serves the GIF over RFB like `dirgui` serves widgets; with
//! `--parent_vnc_addr` it dials out to an embedding parent instead of
//! listening. Frames are decoded up front and cycled on each frame's
//! own delay, so every repaint shows whichever frame is current.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use dirgui::geom::Rect;
use dirgui::rfb::image::{Color, PixelFormatImage};
use dirgui::rfb::server::{self, LegacySecurity, PaintHandle, PaintRequest, ServerOptions};

const LISTEN_ADDR: &str = "127.0.0.1:5900";

/// Show an animated GIF over VNC.
#[derive(Parser, Debug)]
#[command(name = "dirgui-gif")]
struct Cli {
    /// Connect to this address as an outbound VNC server instead of
    /// listening.
    #[arg(long)]
    parent_vnc_addr: Option<String>,

    /// Path to the GIF to show.
    gif: PathBuf,
}

/// All frames of the GIF, fully composited, as RGBA rows.
struct Animation {
    width: u16,
    height: u16,
    frames: Vec<Vec<u8>>,
    /// Per-frame delay in milliseconds.
    delays: Vec<u64>,
}

fn decode_animation(path: &Path) -> anyhow::Result<Animation> {
    let file = std::fs::File::open(path).with_context(|| format!("couldn't open {:?}", path))?;
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options
        .read_info(file)
        .with_context(|| format!("couldn't decode {:?}", path))?;

    let width = decoder.width();
    let height = decoder.height();
    let mut canvas = vec![0u8; 4 * width as usize * height as usize];
    let mut frames = Vec::new();
    let mut delays = Vec::new();

    while let Some(frame) = decoder
        .read_next_frame()
        .with_context(|| format!("couldn't decode {:?}", path))?
    {
        // Composite the frame over the accumulated canvas; fully
        // transparent pixels leave the previous frame showing.
        for row in 0..frame.height as usize {
            for col in 0..frame.width as usize {
                let src = 4 * (row * frame.width as usize + col);
                if frame.buffer[src + 3] == 0 {
                    continue;
                }
                let x = frame.left as usize + col;
                let y = frame.top as usize + row;
                if x >= width as usize || y >= height as usize {
                    continue;
                }
                let dst = 4 * (y * width as usize + x);
                canvas[dst..dst + 4].copy_from_slice(&frame.buffer[src..src + 4]);
            }
        }
        frames.push(canvas.clone());
        delays.push((frame.delay as u64 * 10).max(10));
    }

    anyhow::ensure!(!frames.is_empty(), "{:?} has no frames", path);
    Ok(Animation {
        width,
        height,
        frames,
        delays,
    })
}

/// Spawn the frame clock and the painter, returning the handle server
/// sessions paint through.
fn start_painter(anim: Animation) -> PaintHandle {
    let anim = Arc::new(anim);
    let (frame_tx, frame_rx) = watch::channel(0usize);

    let delays = anim.delays.clone();
    tokio::spawn(async move {
        let mut idx = 0usize;
        loop {
            tokio::time::sleep(Duration::from_millis(delays[idx])).await;
            idx = (idx + 1) % delays.len();
            if frame_tx.send(idx).is_err() {
                return;
            }
        }
    });

    let (tx, mut rx) = mpsc::channel::<PaintRequest>(16);
    tokio::spawn(async move {
        let window = Rect::new(0, 0, anim.width as i32, anim.height as i32);
        while let Some(req) = rx.recv().await {
            let mut img = PixelFormatImage::new(req.format, req.rect);
            let pixels = &anim.frames[*frame_rx.borrow()];

            let x0 = req.rect.min.x.max(0);
            let y0 = req.rect.min.y.max(0);
            let x1 = req.rect.max.x.min(window.max.x);
            let y1 = req.rect.max.y.min(window.max.y);
            for y in y0..y1 {
                for x in x0..x1 {
                    let i = 4 * (y as usize * anim.width as usize + x as usize);
                    img.set(
                        x,
                        y,
                        Color {
                            r: pixels[i],
                            g: pixels[i + 1],
                            b: pixels[i + 2],
                        },
                    );
                }
            }
            let _ = req.reply.send((img, window));
        }
    });

    PaintHandle::new(tx)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let anim = decode_animation(&cli.gif)?;
    info!(
        "showing {:?}: {}x{}, {} frames",
        cli.gif,
        anim.width,
        anim.height,
        anim.frames.len()
    );
    let painter = start_painter(anim);

    let opts = ServerOptions {
        name: "dirgui-gif".into(),
        legacy_security: LegacySecurity::None,
    };

    match cli.parent_vnc_addr {
        Some(addr) => {
            let stream = TcpStream::connect(&addr)
                .await
                .with_context(|| format!("couldn't connect to {addr:?}"))?;
            if let Err(err) = server::serve(stream, opts, painter).await {
                error!("serve failed: {err}");
            }
            Ok(())
        }
        None => {
            let listener = TcpListener::bind(LISTEN_ADDR)
                .await
                .with_context(|| format!("couldn't listen on {LISTEN_ADDR}"))?;
            info!("listening on {LISTEN_ADDR}");
            server::listen(listener, opts, painter)
                .await
                .context("couldn't accept connection")?;
            Ok(())
        }
    }
}
