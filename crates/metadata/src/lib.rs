use std::path::Path;

use lofty::error::LoftyError;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{ItemKey, TaggedFileExt};
use lofty::tag::Tag;

pub mod sidecar;
pub mod text;

pub use sidecar::{parse_info_sidecar, SidecarInfo};
pub use text::{clean_lyrics, clean_text, decode_text_bytes, is_synced_lyrics, repair_mojibake};

#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Raw track number, `"5"` or `"5/12"`.
    pub track_no: Option<String>,
    pub disc_no: Option<String>,
    pub year: Option<i32>,
    pub picture: Option<CoverArt>,
    pub lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Reads the embedded tags of one audio file.
///
/// The primary tag is consulted first; other tags in the container only fill
/// fields it left empty. Text fields go through [`repair_mojibake`].
pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;

    let mut tags: Vec<&Tag> = Vec::new();
    if let Some(primary) = tagged_file.primary_tag() {
        tags.push(primary);
    }
    for tag in tagged_file.tags() {
        if !tags.iter().any(|seen| seen.tag_type() == tag.tag_type()) {
            tags.push(tag);
        }
    }

    Ok(info_from_tags(&tags))
}

/// Fills a [`TagInfo`] from `tags` in order; earlier tags win per field.
fn info_from_tags(tags: &[&Tag]) -> TagInfo {
    let mut info = TagInfo::default();
    for tag in tags {
        fill_if_none(&mut info.title, || tag_text(tag, &ItemKey::TrackTitle));
        fill_if_none(&mut info.artist, || tag_text(tag, &ItemKey::TrackArtist));
        fill_if_none(&mut info.album, || tag_text(tag, &ItemKey::AlbumTitle));
        fill_if_none(&mut info.album_artist, || tag_text(tag, &ItemKey::AlbumArtist));
        fill_if_none(&mut info.track_no, || {
            numbered(tag, &ItemKey::TrackNumber, &ItemKey::TrackTotal)
        });
        fill_if_none(&mut info.disc_no, || {
            numbered(tag, &ItemKey::DiscNumber, &ItemKey::DiscTotal)
        });
        fill_if_none(&mut info.year, || {
            tag.get_string(&ItemKey::Year)
                .and_then(parse_year)
                .or_else(|| tag.get_string(&ItemKey::RecordingDate).and_then(parse_year))
        });
        fill_if_none(&mut info.picture, || {
            pick_picture(tag.pictures()).map(|picture| {
                let data = picture.data().to_vec();
                let mime = guess_mime(&data);
                CoverArt { data, mime }
            })
        });
    }

    let candidates = lyric_candidates(tags);
    info.lyrics = candidates.first().cloned();
    info.synced_lyrics = candidates
        .iter()
        .find(|candidate| is_synced_lyrics(candidate))
        .cloned();

    info
}

fn fill_if_none<T>(slot: &mut Option<T>, value: impl FnOnce() -> Option<T>) {
    if slot.is_none() {
        *slot = value();
    }
}

fn tag_text(tag: &Tag, key: &ItemKey) -> Option<String> {
    let value = tag.get_string(key)?;
    clean_text(&repair_mojibake(value))
}

fn numbered(tag: &Tag, number: &ItemKey, total: &ItemKey) -> Option<String> {
    let value = clean_text(tag.get_string(number)?)?;
    if value.contains('/') {
        return Some(value);
    }
    match tag.get_string(total).and_then(clean_text) {
        Some(total) => Some(format!("{}/{}", value, total)),
        None => Some(value),
    }
}

/// Unsynchronized lyrics first, then the looser container-specific keys.
fn lyric_candidates(tags: &[&Tag]) -> Vec<String> {
    let mut keys = vec![ItemKey::Lyrics];
    for name in ["UNSYNCEDLYRICS", "LYRICS", "SYNCEDLYRICS"] {
        keys.push(ItemKey::Unknown(name.to_string()));
    }

    let mut out: Vec<String> = Vec::new();
    for key in &keys {
        for tag in tags {
            for value in tag.get_strings(key) {
                if let Some(lyrics) = clean_lyrics(&repair_mojibake(value)) {
                    if !out.contains(&lyrics) {
                        out.push(lyrics);
                    }
                }
            }
        }
    }
    out
}

/// First run of up to four digits, e.g. `2022` from `"2022-05-01"`.
pub fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

pub fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else if bytes.starts_with(b"GIF8") {
        Some("image/gif".to_string())
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp".to_string())
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp".to_string())
    } else {
        None
    }
}
