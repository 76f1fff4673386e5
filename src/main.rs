use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use dirgui::rfb::server::{self, LegacySecurity, ServerOptions};
use dirgui::ui::Ui;

const LISTEN_ADDR: &str = "127.0.0.1:5900";

/// Serve a directory as a live GUI over VNC.
#[derive(Parser, Debug)]
#[command(name = "dirgui")]
struct Cli {
    /// Directory to serve (defaults to the current directory).
    dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let dir = cli.dir.unwrap_or_else(|| PathBuf::from("."));

    let ui = Ui::scan(dir).await?;
    let painter = ui.start();

    let listener = TcpListener::bind(LISTEN_ADDR)
        .await
        .with_context(|| format!("couldn't listen on {LISTEN_ADDR}"))?;
    info!("listening on {LISTEN_ADDR}");

    let opts = ServerOptions {
        name: "dirgui".into(),
        legacy_security: LegacySecurity::VncAuth,
    };
    server::listen(listener, opts, painter)
        .await
        .context("couldn't accept connection")?;
    Ok(())
}
