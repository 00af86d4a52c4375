//! System clipboard access for copying and pasting rows.

use anyhow::{anyhow, Result};

pub fn copy_text(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {}", e))?;
    clipboard
        .set_text(text)
        .map_err(|e| anyhow!("Failed to copy: {}", e))
}

pub fn paste_text() -> Result<String> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {}", e))?;
    clipboard
        .get_text()
        .map_err(|e| anyhow!("Failed to read clipboard: {}", e))
}

/// Short status line describing copied text.
pub fn describe(text: &str) -> String {
    let lines = text.lines().count();
    let chars = text.len();
    format!(
        "Copied {} line{}, {} char{}",
        lines,
        if lines == 1 { "" } else { "s" },
        chars,
        if chars == 1 { "" } else { "s" }
    )
}
