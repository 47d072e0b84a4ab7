//! Load `metafiler.toml`, then apply `.env` / environment overrides. CLI flags are applied last by
//! the caller (see `engine::cli`).

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use super::config::{Config, PackagePaths};

/// Parse a config file. Missing sections and fields take their defaults.
pub fn parse_config(s: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(s).context("parse config")?;
    Ok(cfg)
}

/// Resolve the config: explicit `path` must exist; otherwise `./metafiler.toml` is used when
/// present, else built-in defaults. Environment overrides are applied in both cases.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let _ = dotenvy::dotenv();

    let mut cfg = match path {
        Some(p) => {
            let s = std::fs::read_to_string(p)
                .with_context(|| format!("read config {}", p.display()))?;
            parse_config(&s).with_context(|| p.display().to_string())?
        }
        None => {
            let default_path = PathBuf::from(PackagePaths::get().config_filename());
            match std::fs::read_to_string(&default_path) {
                Ok(s) => parse_config(&s).with_context(|| default_path.display().to_string())?,
                Err(_) => {
                    debug!("No {} found; using defaults", default_path.display());
                    Config::default()
                }
            }
        }
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// Overwrite fields from `METAFILER_*` variables. `lookup` is injected so tests don't touch the
/// process environment.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let paths = PackagePaths::get();
    let get = |key: &str| {
        lookup(&paths.env_var(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    if let Some(v) = get("path") {
        cfg.filesystem.path = PathBuf::from(v);
    }
    if let Some(v) = get("database") {
        cfg.storage.database = PathBuf::from(v);
    }
    if let Some(v) = get("collection") {
        cfg.storage.collection = v;
    }
}

/// Write a config with default values to `path`. Refuses to overwrite an existing file.
pub fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists; not overwriting", path.display());
    }
    let body = toml::to_string_pretty(&Config::default()).context("serialize default config")?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    info!("Default configuration file {} generated", path.display());
    Ok(())
}
