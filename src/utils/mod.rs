pub mod http;

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    std::fs::create_dir_all(path).with_context(|| format!("cannot create {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// `$BIZBOT_HOME`, or `~/.bizbot` when unset.
pub fn get_bizbot_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("BIZBOT_HOME") {
        return Ok(PathBuf::from(home));
    }
    Ok(dirs::home_dir()
        .context("no home directory; set BIZBOT_HOME")?
        .join(".bizbot"))
}

/// Replace `path` with `content` via a synced sibling temp file, so readers
/// see either the old or the new file.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let dir = ensure_dir(path.parent().context("path has no parent directory")?)?;
    let mut staged = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("cannot stage a write in {}", dir.display()))?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .with_context(|| format!("cannot replace {}", path.display()))?;
    Ok(())
}

/// Truncate to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
