use std::path::{Path, PathBuf};

const AUDIO_EXTS: &[&str] = &[
    "mp3", "m4a", "m4b", "aac", "flac", "wav", "ogg", "oga", "opus", "weba", "webm", "mp4", "m4v",
    "mov",
];
const LYRICS_EXTS: &[&str] = &["txt"];
const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "avif"];
const INFO_EXTS: &[&str] = &["json"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    Audio,
    Lyrics,
    Image,
    Info,
}

impl FileKind {
    /// Classifies a lowercase extension. Anything unrecognised is ignored by the scanner.
    pub fn classify(ext: &str) -> Option<Self> {
        if AUDIO_EXTS.contains(&ext) {
            Some(FileKind::Audio)
        } else if LYRICS_EXTS.contains(&ext) {
            Some(FileKind::Lyrics)
        } else if IMAGE_EXTS.contains(&ext) {
            Some(FileKind::Image)
        } else if INFO_EXTS.contains(&ext) {
            Some(FileKind::Info)
        } else {
            None
        }
    }

    pub fn of_name(name: &str) -> Option<Self> {
        extension_lower(name).and_then(|ext| Self::classify(&ext))
    }
}

/// Hex blake3 digest of `bytes`.
pub fn content_id(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Last segment of a slash-joined path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Everything before the last slash; empty for root-level names.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn extension_lower(name: &str) -> Option<String> {
    let base = basename(name);
    let idx = base.rfind('.')?;
    if idx == 0 || idx + 1 == base.len() {
        return None;
    }
    Some(base[idx + 1..].to_ascii_lowercase())
}

pub fn strip_extension(name: &str) -> &str {
    let base = basename(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

pub fn normalize_stem(name: &str) -> String {
    strip_extension(name).trim().to_lowercase()
}

pub fn relpath_from(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(path_to_slash_string(rel))
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

fn path_to_slash_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    parts.join("/")
}
