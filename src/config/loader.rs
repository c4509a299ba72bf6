// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable overriding the default config location.
pub const CONFIG_ENV: &str = "CONVOY_CONFIG";

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Relative store paths are resolved against the config file's directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    resolve_store_paths(&mut config, &config_root_dir(path));
    Ok(config)
}

/// Load `path` if given, else the default location.
///
/// A missing file at the *default* location falls back to the built-in
/// single-store configuration; an explicitly named file must exist.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        return load_and_validate(path);
    }
    let default = default_config_path();
    if default.exists() {
        return load_and_validate(&default);
    }
    debug!(path = %default.display(), "no config file found; using built-in defaults");
    ConfigFile::try_from(RawConfigFile::default())
}

/// `$CONVOY_CONFIG` if set, else `Convoy.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Convoy.toml"))
}

fn resolve_store_paths(config: &mut ConfigFile, root: &Path) {
    for store in config.stores.values_mut() {
        if store.path.is_relative() {
            store.path = root.join(&store.path);
        }
    }
}

/// - If the config path has a non-empty parent (e.g. "configs/Convoy.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Convoy.toml" (parent = ""),
///   we keep paths relative to the working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
