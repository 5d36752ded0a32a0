//! Loading and deep-merging layered YAML configuration files.

use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use super::{Config, ConfigError};

/// Directory scanned for `*.yml` files when no `--config` is given.
pub const DEFAULT_CONFIG_DIR: &str = "configs";

/// Loads and merges config files in order; later files override earlier ones.
pub fn load_config_files(paths: &[PathBuf]) -> Result<Config, ConfigError> {
    let mut merged = Value::Mapping(Default::default());

    for path in paths {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let layer: Value = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        match layer {
            Value::Null => debug!(path = %path.display(), "Skipping empty config file"),
            Value::Mapping(_) => {
                debug!(path = %path.display(), "Merging config layer");
                merge_values(&mut merged, layer);
            }
            _ => return Err(ConfigError::NotAMapping(path.clone())),
        }
    }

    Config::from_value(merged)
}

/// Lists `*.yml` and `*.yaml` files in `dir`, sorted by file name.
pub fn default_config_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(ConfigError::NoConfigFiles(dir.to_path_buf()));
    }
    Ok(files)
}

/// Deep-merges `overlay` into `base`.
///
/// Mappings merge key by key; any other value (scalars, sequences, null)
/// replaces what was there.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
