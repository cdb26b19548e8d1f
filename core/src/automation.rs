//! Kiro IDE automation boundary
//!
//! The bridge core only depends on the two traits here; the desktop
//! implementations drive the real IDE with `xdotool` shell-outs, a
//! `sysinfo` process scan and the system clipboard. Both primitives
//! block (keystroke settling delays), so async callers dispatch them
//! through `spawn_blocking`.

use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use sysinfo::System;

/// Injects text into the Kiro chat and probes process liveness.
pub trait Automation: Send + Sync {
    /// Deliver `text` to the Kiro chat input. Returns false on any
    /// failure; the caller reports it, never panics.
    fn send_message(&self, text: &str) -> bool;

    /// Whether a Kiro process is currently alive.
    fn is_running(&self) -> bool;
}

/// Captures the current text of the Kiro chat area.
pub trait SnapshotSource: Send + Sync {
    /// A snapshot of the chat text, or `None` when the read primitive
    /// could not produce one.
    fn read_snapshot(&self) -> Option<String>;
}

/// Window title `xdotool` searches for.
const KIRO_WINDOW_NAME: &str = "Kiro";

/// Process name matched against the process table.
const KIRO_PROCESS_NAME: &str = "kiro";

/// Settle time after focusing the window before typing.
const FOCUS_DELAY: Duration = Duration::from_millis(500);

/// Settle time after a paste/copy keystroke.
const KEY_DELAY: Duration = Duration::from_millis(300);

fn xdotool(args: &[&str]) -> bool {
    match Command::new("xdotool").args(args).status() {
        Ok(status) => status.success(),
        Err(e) => {
            log::error!("xdotool {:?} failed: {e}", args.first().unwrap_or(&""));
            false
        }
    }
}

fn focus_kiro_window() -> bool {
    xdotool(&[
        "search",
        "--onlyvisible",
        "--name",
        KIRO_WINDOW_NAME,
        "windowactivate",
        "--sync",
    ])
}

/// Drives the desktop Kiro IDE: clipboard paste for message delivery,
/// process table scan for liveness.
pub struct DesktopAutomation {
    system: Mutex<System>,
}

impl DesktopAutomation {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for DesktopAutomation {
    fn default() -> Self {
        Self::new()
    }
}

impl Automation for DesktopAutomation {
    fn send_message(&self, text: &str) -> bool {
        if !focus_kiro_window() {
            log::error!("could not focus the Kiro window");
            return false;
        }
        std::thread::sleep(FOCUS_DELAY);

        let mut clipboard = match arboard::Clipboard::new() {
            Ok(clipboard) => clipboard,
            Err(e) => {
                log::error!("clipboard unavailable: {e}");
                return false;
            }
        };
        if let Err(e) = clipboard.set_text(text.to_string()) {
            log::error!("failed to place message on clipboard: {e}");
            return false;
        }

        // Paste and submit.
        if !xdotool(&["key", "--clearmodifiers", "ctrl+v"]) {
            return false;
        }
        std::thread::sleep(KEY_DELAY);
        if !xdotool(&["key", "--clearmodifiers", "Return"]) {
            return false;
        }

        let preview: String = text.chars().take(50).collect();
        log::info!("message delivered to Kiro: {preview}");
        true
    }

    fn is_running(&self) -> bool {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_processes();
        system
            .processes()
            .values()
            .any(|p| p.name().to_lowercase().contains(KIRO_PROCESS_NAME))
    }
}

/// Reads the chat area through the clipboard: select-all, copy, read,
/// then restore whatever was on the clipboard before.
pub struct ClipboardSnapshot;

impl ClipboardSnapshot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClipboardSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for ClipboardSnapshot {
    fn read_snapshot(&self) -> Option<String> {
        let mut clipboard = match arboard::Clipboard::new() {
            Ok(clipboard) => clipboard,
            Err(e) => {
                log::error!("clipboard unavailable: {e}");
                return None;
            }
        };
        let previous = clipboard.get_text().unwrap_or_default();

        if !xdotool(&["key", "--clearmodifiers", "ctrl+a"]) {
            return None;
        }
        if !xdotool(&["key", "--clearmodifiers", "ctrl+c"]) {
            return None;
        }
        // Give the clipboard time to pick up the copy.
        std::thread::sleep(KEY_DELAY);

        let text = match clipboard.get_text() {
            Ok(text) => text,
            Err(e) => {
                log::error!("failed to read chat text from clipboard: {e}");
                return None;
            }
        };
        let _ = clipboard.set_text(previous);
        Some(text)
    }
}
