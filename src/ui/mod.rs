//! The immediate-mode UI that turns a directory into widgets.
//!
//! One regular file is one row: plain files get a line editor with Load
//! and Save buttons, executables get a Run button, and a file with a
//! `.gui` sibling gets that companion's framebuffer embedded as a panel.
//! All widget state lives on one painter task; viewer sessions reach it
//! only through [`PaintRequest`]s, so concurrent viewers can't trample
//! each other's frames.

pub mod button;
pub mod editor;
pub mod nested;
pub mod text;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::geom::Rect;
use crate::rfb::image::{PixelFormatImage, BLACK, WHITE};
use crate::rfb::protocol::{KeyEvent, PointerEvent};
use crate::rfb::server::{PaintHandle, PaintRequest};
use crate::ui::button::{button, ButtonState};
use crate::ui::editor::{edit, EditorState};
use crate::ui::nested::NestedGui;

/// Window width: 40 glyph cells.
pub const WINDOW_WIDTH: i32 = 40 * 8;

enum WidgetKind {
    Plain {
        content: Arc<Mutex<String>>,
        editor: EditorState,
        loading: Arc<AtomicBool>,
        saving: Arc<AtomicBool>,
        load_button: ButtonState,
        save_button: ButtonState,
    },
    Executable {
        running: Arc<AtomicBool>,
        button: ButtonState,
    },
    Nested(NestedGui),
}

struct Widget {
    name: String,
    kind: WidgetKind,
}

impl Widget {
    fn plain(name: String) -> Widget {
        Widget {
            name,
            kind: WidgetKind::Plain {
                content: Arc::new(Mutex::new(String::new())),
                editor: EditorState::default(),
                loading: Arc::new(AtomicBool::new(false)),
                saving: Arc::new(AtomicBool::new(false)),
                load_button: ButtonState::default(),
                save_button: ButtonState::default(),
            },
        }
    }

    fn executable(name: String) -> Widget {
        Widget {
            name,
            kind: WidgetKind::Executable {
                running: Arc::new(AtomicBool::new(false)),
                button: ButtonState::default(),
            },
        }
    }
}

/// The widget list and the directory it was built from. Created once at
/// startup and then owned by the painter task.
pub struct Ui {
    dir: PathBuf,
    widgets: Vec<Widget>,
}

impl Ui {
    /// Build the widget list from one non-recursive directory read.
    /// Dotfiles and subdirectories are skipped; an entry named
    /// `<previous>.gui` is launched as a companion GUI and merged into
    /// the previous widget instead of getting its own row.
    pub async fn scan(dir: impl Into<PathBuf>) -> anyhow::Result<Ui> {
        let dir = dir.into();
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("couldn't read directory {:?}", dir))?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!("skipping non-UTF-8 entry {name:?}");
                    continue;
                }
            };
            let metadata = entry.metadata().await?;
            entries.push((name, metadata));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut widgets: Vec<Widget> = Vec::new();
        for (name, metadata) in entries {
            if metadata.is_dir() || name.starts_with('.') {
                continue;
            }
            if let Some(prev) = widgets.last_mut() {
                if name == format!("{}.gui", prev.name) {
                    let gui = nested::launch(&dir, &name, &prev.name)
                        .await
                        .with_context(|| format!("couldn't launch nested gui {name:?}"))?;
                    prev.kind = WidgetKind::Nested(gui);
                    continue;
                }
            }
            if metadata.permissions().mode() & 0o111 != 0 {
                widgets.push(Widget::executable(name));
            } else {
                widgets.push(Widget::plain(name));
            }
        }

        info!("serving {} widgets from {:?}", widgets.len(), dir);
        Ok(Ui { dir, widgets })
    }

    /// Move the UI onto its own task and hand back the paint handle
    /// sessions talk to.
    pub fn start(self) -> PaintHandle {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(self.run(rx));
        PaintHandle::new(tx)
    }

    async fn run(mut self, mut requests: mpsc::Receiver<PaintRequest>) {
        while let Some(req) = requests.recv().await {
            let mut img = PixelFormatImage::new(req.format, req.rect);
            let window = self.paint(&mut img, &req.key, &req.pointer);
            let _ = req.reply.send((img, window));
        }
    }

    /// Paint every widget into `img` and apply input side effects.
    /// Returns the full window rectangle.
    fn paint(&mut self, img: &mut PixelFormatImage, key: &KeyEvent, pointer: &PointerEvent) -> Rect {
        img.fill(img.bounds(), WHITE);

        let dir = self.dir.clone();
        let count = self.widgets.len();
        let mut y = 8; // top padding

        for (idx, widget) in self.widgets.iter_mut().enumerate() {
            let name = widget.name.clone();
            match &mut widget.kind {
                WidgetKind::Nested(gui) => {
                    label(img, Rect::new(8, y, WINDOW_WIDTH - 16, y + 8), &name);
                    y += 2 * 8;

                    let frame = gui.frame.lock().unwrap().clone();
                    if let Some(frame) = frame {
                        img.draw_image(
                            Rect::new(8, y, 8 + gui.size.x, y + gui.size.y),
                            &frame,
                            frame.bounds().min,
                        );
                    }
                    y += gui.size.y + 8;
                }

                WidgetKind::Executable { running, button: state } => {
                    let mut caption = name.clone();
                    if running.load(Ordering::SeqCst) {
                        caption.push_str("...");
                    }
                    let rect = Rect::new(8, y, 30 * 8, y + 3 * 8);
                    if button(state, &caption, rect, img, pointer) && !running.load(Ordering::SeqCst)
                    {
                        running.store(true, Ordering::SeqCst);
                        run_executable(dir.clone(), name, running.clone());
                    }
                    y += 3 * 8;
                }

                WidgetKind::Plain {
                    content,
                    editor,
                    loading,
                    saving,
                    load_button,
                    save_button,
                } => {
                    label(img, Rect::new(8, y, WINDOW_WIDTH - 16, y + 8), &name);
                    y += 2 * 8;

                    let mut x = 8;
                    {
                        let mut text = content.lock().unwrap();
                        edit(
                            editor,
                            &mut text,
                            Rect::new(x, y, x + 22 * 8, y + 3 * 8),
                            img,
                            key,
                            pointer,
                        );
                    }
                    x += 23 * 8;

                    let busy = loading.load(Ordering::SeqCst) || saving.load(Ordering::SeqCst);

                    let mut caption = String::from("Load");
                    if loading.load(Ordering::SeqCst) {
                        caption.push_str("...");
                    }
                    let rect = Rect::new(x, y, x + 7 * 8, y + 3 * 8);
                    if button(load_button, &caption, rect, img, pointer) && !busy {
                        loading.store(true, Ordering::SeqCst);
                        load_file(dir.join(&name), content.clone(), loading.clone());
                    }
                    x += 8 * 8;

                    let mut caption = String::from("Save");
                    if saving.load(Ordering::SeqCst) {
                        caption.push_str("...");
                    }
                    let rect = Rect::new(x, y, x + 7 * 8, y + 3 * 8);
                    if button(save_button, &caption, rect, img, pointer) && !busy {
                        saving.store(true, Ordering::SeqCst);
                        let snapshot = content.lock().unwrap().clone();
                        save_file(dir.join(&name), snapshot, saving.clone());
                    }

                    y += 3 * 8;
                }
            }

            y += 8;
            if idx + 1 < count {
                y += 8;
            }
        }

        Rect::new(0, 0, WINDOW_WIDTH, y)
    }
}

/// Draw a black label along the top of `rect`.
fn label(img: &mut PixelFormatImage, rect: Rect, text: &str) {
    text::draw_text(img, rect.min, text, BLACK);
}

fn run_executable(dir: PathBuf, name: String, running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let path = dir.join(&name);
        info!("running {:?}", path);
        match Command::new(&path).current_dir(&dir).spawn() {
            Ok(mut child) => match child.wait().await {
                Ok(status) if !status.success() => warn!("{name} exited with {status}"),
                Ok(_) => {}
                Err(err) => warn!("couldn't wait for {name}: {err}"),
            },
            Err(err) => warn!("exec failed: {err}"),
        }
        running.store(false, Ordering::SeqCst);
    });
}

fn load_file(path: PathBuf, content: Arc<Mutex<String>>, loading: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match read_first_line(&path).await {
            Ok(line) => *content.lock().unwrap() = line,
            Err(err) => warn!("couldn't read {:?}: {err}", path),
        }
        loading.store(false, Ordering::SeqCst);
    });
}

async fn read_first_line(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).await?;
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(line)
}

fn save_file(path: PathBuf, content: String, saving: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if let Err(err) = write_whole_file(&path, &content).await {
            warn!("couldn't write {:?}: {err}", path);
        }
        saving.store(false, Ordering::SeqCst);
    });
}

async fn write_whole_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    Ok(())
}
