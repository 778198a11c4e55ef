use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use metadata::{clean_lyrics, decode_text_bytes};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LyricsIndex {
    pub version: u32,
    pub updated_at: Option<String>,
    pub rules: Vec<LyricsRule>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LyricsRule {
    pub keyword: String,
    pub file_name: String,
}

impl LyricsIndex {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// First rule whose keyword occurs in `title`, ignoring case.
    pub fn find(&self, title: &str) -> Option<&LyricsRule> {
        let title = title.to_lowercase();
        self.rules.iter().find(|rule| {
            let keyword = rule.keyword.trim();
            !keyword.is_empty() && title.contains(&keyword.to_lowercase())
        })
    }
}

/// Lyrics files listed by an index, read on demand and kept in memory.
#[derive(Debug, Default)]
pub struct LyricsLibrary {
    base: PathBuf,
    index: LyricsIndex,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl LyricsLibrary {
    pub fn new(base: PathBuf, index: LyricsIndex) -> Self {
        Self {
            base,
            index,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the index at `path`; rule files resolve relative to its folder.
    /// A missing or malformed index yields an empty library.
    pub fn load(path: &Path) -> Self {
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let index = match fs::read(path) {
            Ok(bytes) => match LyricsIndex::parse(&decode_text_bytes(&bytes)) {
                Ok(index) => {
                    info!("Loaded {} lyrics rules from {}", index.rules.len(), path.display());
                    index
                }
                Err(err) => {
                    warn!("Lyrics index {} is malformed: {}", path.display(), err);
                    LyricsIndex::default()
                }
            },
            Err(err) => {
                warn!("Lyrics index {} unavailable: {}", path.display(), err);
                LyricsIndex::default()
            }
        };
        Self::new(base, index)
    }

    pub fn index(&self) -> &LyricsIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index.rules.is_empty()
    }

    pub async fn lyrics_for(&self, title: &str) -> Option<String> {
        let file_name = self.index.find(title)?.file_name.clone();
        if let Some(cached) = self.cache.lock().get(&file_name) {
            return cached.clone();
        }

        let loaded = match self.rule_path(&file_name) {
            Some(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => clean_lyrics(&decode_text_bytes(&bytes)),
                Err(err) => {
                    debug!("Failed to read lyrics file {}: {}", path.display(), err);
                    None
                }
            },
            None => {
                warn!("Lyrics rule points outside the index folder: {}", file_name);
                None
            }
        };
        self.cache.lock().insert(file_name, loaded.clone());
        loaded
    }

    fn rule_path(&self, file_name: &str) -> Option<PathBuf> {
        let relative = Path::new(file_name);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if file_name.trim().is_empty() || !plain {
            return None;
        }
        Some(self.base.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "version": 1,
        "updatedAt": "2024-01-02",
        "rules": [
            { "keyword": "Moon", "fileName": "moon.txt" },
            { "keyword": "", "fileName": "never.txt" },
            { "keyword": "escape", "fileName": "../secret.txt" }
        ]
    }"#;

    #[test]
    fn finds_rules_by_keyword() {
        let index = LyricsIndex::parse(INDEX).unwrap();
        assert_eq!(index.updated_at.as_deref(), Some("2024-01-02"));
        assert_eq!(index.find("Blue moon (live)").unwrap().file_name, "moon.txt");
        assert!(index.find("Sun").is_none());
    }

    #[tokio::test]
    async fn reads_and_caches_rule_files() {
        let tmp = tempfile::tempdir().unwrap();
        let index_path = tmp.path().join("index.json");
        fs::write(&index_path, INDEX).unwrap();
        fs::write(tmp.path().join("moon.txt"), "\u{feff}la la\r\n").unwrap();

        let library = LyricsLibrary::load(&index_path);
        assert_eq!(library.lyrics_for("Moon").await.as_deref(), Some("la la"));

        fs::remove_file(tmp.path().join("moon.txt")).unwrap();
        assert_eq!(library.lyrics_for("moon").await.as_deref(), Some("la la"));
        assert_eq!(library.lyrics_for("escape").await, None);
        assert_eq!(library.lyrics_for("nothing").await, None);
    }

    #[test]
    fn missing_index_is_empty() {
        let library = LyricsLibrary::load(Path::new("/not/here/index.json"));
        assert!(library.is_empty());
    }
}
