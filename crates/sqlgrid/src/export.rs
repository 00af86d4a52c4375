//! Comma-space text export of the cached rows.
//!
//! The header row comes first, then one line per row. Every field is
//! followed by `", "` and the last column is never written.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::window::RowWindow;

pub fn write_export<W: Write>(out: &mut W, window: &RowWindow) -> io::Result<()> {
    let shown = window.headers.len().saturating_sub(1);
    for header in &window.headers[..shown] {
        write!(out, "{}, ", header)?;
    }
    for row in &window.rows {
        writeln!(out)?;
        for cell in row.iter().take(row.len().saturating_sub(1)) {
            write!(out, "{}, ", cell)?;
        }
    }
    Ok(())
}

/// Write the export to `path`, replacing it atomically.
pub fn export_to_path(window: &RowWindow, path: &Path) -> Result<usize> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;
    write_export(&mut tmp, window).context("Failed to write export")?;
    tmp.flush().context("Failed to flush export")?;
    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;

    Ok(window.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RowWindow {
        RowWindow {
            headers: vec!["id".into(), "host".into(), "note".into()],
            rows: vec![
                vec!["1".into(), "alpha".into(), "x".into()],
                vec!["2".into(), "".into(), "y".into()],
            ],
            ..RowWindow::default()
        }
    }

    #[test]
    fn test_export_omits_last_column() {
        let mut out = Vec::new();
        write_export(&mut out, &window()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id, host, \n1, alpha, \n2, , "
        );
    }

    #[test]
    fn test_export_empty_window() {
        let mut out = Vec::new();
        write_export(&mut out, &RowWindow::default()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let rows = export_to_path(&window(), &path).unwrap();
        assert_eq!(rows, 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("id, host, \n"));
    }
}
