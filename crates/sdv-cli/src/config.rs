//! Configuration Vault – reads/writes `~/.sdv-console/config.toml`.

use sdv_console::ConsoleConfig;
use std::fs;
use std::path::PathBuf;

/// Return the path to `~/.sdv-console/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sdv-console").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<ConsoleConfig>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<ConsoleConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: ConsoleConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SDV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SDV_BRIDGE_HOST` | `bridge_host` |
/// | `SDV_BRIDGE_PORT` | `bridge_port` |
/// | `SDV_POSE_TOPIC` | `topics.pose` |
pub fn apply_env_overrides(cfg: &mut ConsoleConfig) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

fn apply_overrides(cfg: &mut ConsoleConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("SDV_BRIDGE_HOST")
        && !v.trim().is_empty()
    {
        cfg.bridge_host = v.trim().to_string();
    }
    if let Some(v) = var("SDV_BRIDGE_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.bridge_port = port;
    }
    if let Some(v) = var("SDV_POSE_TOPIC") {
        cfg.topics.pose = v;
    }
}

/// Save the config to disk, creating `~/.sdv-console/` if necessary.
pub fn save(cfg: &ConsoleConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &ConsoleConfig, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
