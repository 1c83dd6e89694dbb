//! Initialize the configuration directory: create ~/.lsgate, a default config, and the sandbox root.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates the sandbox root (resolved from the config) if missing.
///
/// Returns the sandbox root.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (cfg, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let root = config::resolve_sandbox_root(&cfg, config_path);
    if !root.exists() {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating sandbox root {}", root.display()))?;
        log::info!("created sandbox root at {}", root.display());
    } else if !root.is_dir() {
        anyhow::bail!("sandbox root exists but is not a directory: {}", root.display());
    } else {
        log::debug!("sandbox root already exists at {}, skipping", root.display());
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_config_and_root_once() {
        if std::env::var("LSGATE_SANDBOX_ROOT").is_ok() {
            return;
        }
        let dir = std::env::temp_dir().join(format!("lsgate-init-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("config.json");
        let root = init_config_dir(&config_path).unwrap();
        assert_eq!(root, dir.join("data"));
        assert!(root.is_dir());
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "{}");

        std::fs::write(root.join("keep.txt"), b"x").unwrap();
        let again = init_config_dir(&config_path).unwrap();
        assert_eq!(again, root);
        assert!(root.join("keep.txt").exists());
    }

    #[test]
    fn honors_configured_root() {
        if std::env::var("LSGATE_SANDBOX_ROOT").is_ok() {
            return;
        }
        let dir = std::env::temp_dir().join(format!("lsgate-init-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.json");
        std::fs::write(&config_path, br#"{"sandbox":{"root":"listing"}}"#).unwrap();
        let root = init_config_dir(&config_path).unwrap();
        assert_eq!(root, dir.join("listing"));
        assert!(root.is_dir());
    }
}
