//! Global debug shortcuts. Strictly diagnostic: the save hotkey reads the
//! last-capture buffer directly and never touches the state machine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};
use tauri::AppHandle;
use tauri_plugin_global_shortcut::{Builder, Code, Modifiers, Shortcut, ShortcutState};

use crate::capture::{self, LastFrame};
use crate::session::SessionHandle;

#[cfg(target_os = "macos")]
const PRIMARY: Modifiers = Modifiers::SUPER;
#[cfg(not(target_os = "macos"))]
const PRIMARY: Modifiers = Modifiers::CONTROL;

pub fn register(
    app: &AppHandle,
    session: SessionHandle,
    last_frame: LastFrame,
    debug_dir: PathBuf,
) -> Result<()> {
    let save_shortcut = Shortcut::new(Some(PRIMARY | Modifiers::SHIFT), Code::KeyS);
    let debug_box_shortcut = Shortcut::new(Some(PRIMARY | Modifiers::SHIFT), Code::KeyD);

    app.plugin(
        Builder::new()
            .with_shortcuts([save_shortcut, debug_box_shortcut])
            .context("failed to parse debug shortcuts")?
            .with_handler(move |_app, shortcut, event| {
                if event.state() != ShortcutState::Pressed {
                    return;
                }
                if shortcut == &save_shortcut {
                    match capture::save_debug_frame(&last_frame, &debug_dir) {
                        Ok(path) => info!("debug frame saved to {}", path.display()),
                        Err(err) => warn!("debug save failed: {err:#}"),
                    }
                } else if shortcut == &debug_box_shortcut {
                    let session = session.clone();
                    tauri::async_runtime::spawn(async move {
                        session.toggle_debug_box().await;
                    });
                }
            })
            .build(),
    )
    .context("failed to register global shortcuts")?;
    Ok(())
}
