use crate::config::Config;
use crate::utils::{atomic_write, ensure_dir, get_bizbot_home};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_bizbot_home()?.join("config.json"))
}

/// Load config from `config_path` (or the default location), apply env
/// overrides and validate. A missing file yields the default config.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let path = resolve_path(config_path);

    let mut config = if path.exists() {
        read_locked(&path)?
    } else {
        debug!("no config at {}, using defaults", path.display());
        Config::default()
    };

    crate::config::credentials::apply_env_overrides(&mut config);
    config.validate().context("invalid bizbot configuration")?;
    Ok(config)
}

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path().unwrap_or_else(|_| PathBuf::from("config.json")),
    }
}

fn read_locked(path: &Path) -> Result<Config> {
    // Readers share the lock; save_config takes it exclusively
    let file =
        fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    file.lock_shared()
        .with_context(|| format!("cannot lock {}", path.display()))?;

    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    warn_if_exposed(path);

    serde_json::from_str(&content).with_context(|| format!("malformed JSON in {}", path.display()))
}

/// Config holds bot and vendor secrets.
#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = fs::metadata(path) else {
        return;
    };
    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        warn!("{} is readable by other users ({:o}), run chmod 600", path.display(), mode);
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}

/// Write `config` as pretty JSON with 0600 permissions.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let path = resolve_path(config_path);
    ensure_dir(path.parent().context("config path has no parent directory")?)?;

    // atomic_write swaps the inode, so the lock lives in a sidecar file
    let lock_path = path.with_extension("json.lock");
    let lock = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("cannot create {}", lock_path.display()))?;
    lock.lock_exclusive()
        .with_context(|| format!("cannot lock {}", lock_path.display()))?;

    let json = serde_json::to_string_pretty(config)?;
    atomic_write(&path, &json).with_context(|| format!("cannot write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o600)) {
            warn!("could not restrict permissions on {}: {}", path.display(), e);
        }
    }
    Ok(())
}
