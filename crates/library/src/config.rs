use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::enrich::DEFAULT_LANES;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_ENV: &str = "SHELF_CONFIG";
const CONFIG_FILE: &str = "shelf.yaml";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibraryConfig {
    pub version: u32,
    pub music_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_index_path: Option<String>,
    pub enrich_concurrency: usize,
    pub cover_concurrency: usize,
    pub group_by_album: bool,
    pub shuffle: bool,
    pub mapping_groups: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            music_root: "".to_string(),
            mapping_path: None,
            lyrics_index_path: None,
            enrich_concurrency: DEFAULT_LANES,
            cover_concurrency: DEFAULT_LANES,
            group_by_album: true,
            shuffle: false,
            mapping_groups: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var(CONFIG_ENV) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE)),
        Err(_) => PathBuf::from(CONFIG_FILE),
    }
}

/// Reads the config at `path`, writing defaults first when it does not exist.
/// The flag is true when the file was just created.
pub fn load_or_create_config(path: &Path) -> Result<(LibraryConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: LibraryConfig = serde_yaml::from_str(&contents)?;
        if config.version < CONFIG_VERSION {
            config.version = CONFIG_VERSION;
        }
        if config.enrich_concurrency == 0 {
            config.enrich_concurrency = DEFAULT_LANES;
        }
        if config.cover_concurrency == 0 {
            config.cover_concurrency = DEFAULT_LANES;
        }
        config.mapping_path = config.mapping_path.filter(|p| !p.trim().is_empty());
        config.lyrics_index_path = config.lyrics_index_path.filter(|p| !p.trim().is_empty());
        return Ok((config, false));
    }

    let config = LibraryConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &LibraryConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

pub fn resolve_optional(config_path: &Path, value: Option<&str>) -> Option<PathBuf> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(resolve_path(config_path, trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("shelf.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert_eq!(config, LibraryConfig::default());

        let (again, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(again, config);
    }

    #[test]
    fn normalizes_loaded_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("shelf.yaml");
        fs::write(
            &path,
            "version: 0\nmusic_root: music\nmapping_path: ' '\nenrich_concurrency: 0\nshuffle: true\n",
        )
        .unwrap();
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.enrich_concurrency, DEFAULT_LANES);
        assert_eq!(config.cover_concurrency, DEFAULT_LANES);
        assert_eq!(config.mapping_path, None);
        assert!(config.shuffle);
        assert!(config.group_by_album);
        assert_eq!(
            resolve_optional(&path, Some(config.music_root.as_str())),
            Some(tmp.path().join("music"))
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let config_path = Path::new("/etc/shelf/shelf.yaml");
        assert_eq!(resolve_path(config_path, "/srv/music"), PathBuf::from("/srv/music"));
        assert_eq!(resolve_path(config_path, "map.tsv"), PathBuf::from("/etc/shelf/map.tsv"));
        assert_eq!(resolve_optional(config_path, Some("  ")), None);
    }
}
