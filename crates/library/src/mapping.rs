use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

const PREFIX_LEN: usize = 8;

/// One row of the release mapping table, keyed by a hex prefix in file names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingRow {
    pub prefix_id: Option<String>,
    pub album_title: String,
    pub track: Option<u32>,
    pub title: String,
    pub original_artist: Option<String>,
}

/// Parses a tab- or comma-delimited table.
///
/// The delimiter is picked from the first line that is neither blank nor a
/// `#` comment. Columns: prefixId, albumTitle, track, title, originalArtist.
pub fn parse_mapping_table(text: &str) -> Vec<MappingRow> {
    let delimiter = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| if line.contains('\t') { '\t' } else { ',' })
        .unwrap_or('\t');

    text.lines()
        .filter_map(|line| parse_mapping_line(line, delimiter))
        .collect()
}

pub fn parse_mapping_line(line: &str, delimiter: char) -> Option<MappingRow> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let cells: Vec<&str> = line.split(delimiter).map(str::trim).collect();
    let cell = |idx: usize| cells.get(idx).copied().unwrap_or("");
    if cell(0).eq_ignore_ascii_case("prefixid") {
        return None;
    }

    let album_title = cell(1);
    let title = cell(3);
    if album_title.is_empty() || title.is_empty() {
        return None;
    }

    Some(MappingRow {
        prefix_id: non_empty(cell(0)),
        album_title: album_title.to_string(),
        track: cell(2).parse().ok(),
        title: title.to_string(),
        original_artist: non_empty(cell(4)),
    })
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// The 8-hex-digit token followed by `_`, at the start of the path or of a segment.
pub fn extract_prefix(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    for start in 0..bytes.len() {
        if start > 0 && !matches!(bytes[start - 1], b'/' | b'\\') {
            continue;
        }
        let end = start + PREFIX_LEN;
        if end >= bytes.len() {
            break;
        }
        if bytes[start..end].iter().all(u8::is_ascii_hexdigit) && bytes[end] == b'_' {
            return Some(path[start..end].to_ascii_lowercase());
        }
    }
    None
}

/// Rows indexed by lower-cased prefix.
#[derive(Clone, Debug, Default)]
pub struct MappingIndex {
    rows: HashMap<String, MappingRow>,
}

impl MappingIndex {
    pub fn from_rows(rows: Vec<MappingRow>) -> Self {
        let mut index = HashMap::new();
        for row in rows {
            let key = match &row.prefix_id {
                Some(prefix) => prefix.to_ascii_lowercase(),
                None => continue,
            };
            if index.contains_key(&key) {
                debug!("Duplicate mapping prefix {}; keeping the first row", key);
                continue;
            }
            index.insert(key, row);
        }
        Self { rows: index }
    }

    pub fn parse(text: &str) -> Self {
        Self::from_rows(parse_mapping_table(text))
    }

    /// Reads the table once per session. A missing or unreadable file yields an empty index.
    pub fn load(path: &Path) -> Self {
        match fs::read(path) {
            Ok(bytes) => {
                let index = Self::parse(&metadata::decode_text_bytes(&bytes));
                info!("Loaded {} mapping rows from {}", index.len(), path.display());
                index
            }
            Err(err) => {
                warn!("Mapping table {} unavailable: {}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn get(&self, prefix: &str) -> Option<&MappingRow> {
        self.rows.get(&prefix.to_ascii_lowercase())
    }

    pub fn lookup_path(&self, path: &str) -> Option<&MappingRow> {
        if self.rows.is_empty() {
            return None;
        }
        extract_prefix(path).and_then(|prefix| self.rows.get(&prefix))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_delimited_rows() {
        let text = "# releases\n\
                    prefixId\talbumTitle\ttrack\ttitle\toriginalArtist\n\
                    5396E324\tFantia 2022-05\t10\tSong A\tOriginal\n\
                    \n\
                    \tNo Prefix\tx\tSong B\t\n\
                    abcdef01\t\t1\tMissing Album\tX\n";
        let rows = parse_mapping_table(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            MappingRow {
                prefix_id: Some("5396E324".to_string()),
                album_title: "Fantia 2022-05".to_string(),
                track: Some(10),
                title: "Song A".to_string(),
                original_artist: Some("Original".to_string()),
            }
        );
        assert_eq!(rows[1].prefix_id, None);
        assert_eq!(rows[1].track, None);
        assert_eq!(rows[1].original_artist, None);
    }

    #[test]
    fn falls_back_to_commas() {
        let rows = parse_mapping_table("  \n1234abcd, Album , 2 , Title ,\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].album_title, "Album");
        assert_eq!(rows[0].track, Some(2));
        assert_eq!(rows[0].original_artist, None);
    }

    #[test]
    fn prefix_must_start_a_segment() {
        assert_eq!(extract_prefix("5396E324_song.mp3").as_deref(), Some("5396e324"));
        assert_eq!(extract_prefix("misc/5396e324_anything.mp3").as_deref(), Some("5396e324"));
        assert_eq!(extract_prefix("misc\\5396e324_x.mp3").as_deref(), Some("5396e324"));
        assert_eq!(extract_prefix("misc/x5396e324_anything.mp3"), None);
        assert_eq!(extract_prefix("misc/5396e32_anything.mp3"), None);
        assert_eq!(extract_prefix("misc/5396e324-anything.mp3"), None);
        assert_eq!(extract_prefix("5396e324"), None);
    }

    #[test]
    fn index_looks_up_paths_case_insensitively() {
        let index = MappingIndex::parse("5396E324\tFantia 2022-05\t10\tSong A\tOriginal\n");
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup_path("misc/5396e324_anything.mp3").unwrap().title, "Song A");
        assert_eq!(index.get("5396E324").unwrap().track, Some(10));
        assert!(index.lookup_path("misc/deadbeef_other.mp3").is_none());
    }

    #[test]
    fn missing_table_is_empty() {
        let index = MappingIndex::load(Path::new("/definitely/not/here.tsv"));
        assert!(index.is_empty());
    }
}
