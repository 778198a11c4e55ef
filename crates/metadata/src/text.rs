use std::borrow::Cow;

use encoding_rs::SHIFT_JIS;

/// Share of U+0080..=U+00FF chars above which a Latin-1 string is suspected to be mis-decoded.
const MOJIBAKE_RATIO: f32 = 0.3;

/// Reinterprets Shift-JIS text that a tagger stored as Latin-1.
///
/// Only strings made entirely of Latin-1 code points, with a high share of
/// high-byte chars and no Japanese chars, are touched. The candidate decode
/// must be error free; Shift-JIS is tried first, then UTF-8.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    let mut total = 0usize;
    let mut high = 0usize;
    for ch in text.chars() {
        if is_japanese(ch) || u32::from(ch) > 0xFF {
            return Cow::Borrowed(text);
        }
        total += 1;
        if u32::from(ch) >= 0x80 {
            high += 1;
        }
    }
    if high == 0 || (high as f32) / (total as f32) < MOJIBAKE_RATIO {
        return Cow::Borrowed(text);
    }

    let bytes: Vec<u8> = text.chars().map(|ch| u32::from(ch) as u8).collect();
    if let Some(decoded) = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(&bytes) {
        if decoded.chars().any(is_japanese) && !decoded.chars().any(is_private_use) {
            return Cow::Owned(decoded.into_owned());
        }
    }
    match String::from_utf8(bytes) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(_) => Cow::Borrowed(text),
    }
}

pub fn is_japanese(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xFF61..=0xFF9F
    )
}

fn is_private_use(ch: char) -> bool {
    matches!(u32::from(ch), 0xE000..=0xF8FF)
}

/// Decodes a sidecar text file: strict UTF-8, then Shift-JIS, then lossy UTF-8.
/// A leading byte-order mark is dropped and line endings become `\n`.
pub fn decode_text_bytes(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => match SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => text.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    };
    let text = match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    };
    normalize_newlines(&text)
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Normalized lyrics, or `None` when nothing but whitespace remains.
pub fn clean_lyrics(text: &str) -> Option<String> {
    let normalized = normalize_newlines(text);
    let trimmed = normalized.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Trims a tag/sidecar string, drops NUL bytes and maps blank values to `None`.
pub fn clean_text(text: &str) -> Option<String> {
    let stripped: String = text.chars().filter(|ch| *ch != '\0').collect();
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// True when any line carries an LRC timestamp such as `[01:23.45]`.
pub fn is_synced_lyrics(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix('[') else {
            return false;
        };
        let Some(close) = rest.find(']') else {
            return false;
        };
        let stamp = &rest[..close];
        let Some((minutes, seconds)) = stamp.split_once(':') else {
            return false;
        };
        !minutes.is_empty()
            && minutes.chars().all(|c| c.is_ascii_digit())
            && seconds.chars().next().is_some_and(|c| c.is_ascii_digit())
    })
}
