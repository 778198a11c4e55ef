use serde::de::IgnoredAny;
use serde::Deserialize;

use crate::text::{clean_lyrics, clean_text, decode_text_bytes};

pub const INFO_SCHEMA_VERSION: i64 = 1;

/// Normalized contents of a `<track>.json` info sidecar.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SidecarInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_no: Option<String>,
    pub disc_no: Option<String>,
    pub year: Option<i32>,
    pub lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawInfo {
    version: Option<Scalar>,
    title: Option<Scalar>,
    artist: Option<Scalar>,
    album: Option<Scalar>,
    #[serde(alias = "album_artist")]
    album_artist: Option<Scalar>,
    #[serde(alias = "track_number")]
    track_number: Option<Scalar>,
    track: Option<Scalar>,
    #[serde(alias = "disc_number")]
    disc_number: Option<Scalar>,
    disc: Option<Scalar>,
    year: Option<Scalar>,
    lyrics: Option<Scalar>,
    #[serde(alias = "synced_lyrics")]
    synced_lyrics: Option<Scalar>,
}

/// Parses an info sidecar. Malformed documents and unknown schema versions are absent.
pub fn parse_info_sidecar(bytes: &[u8]) -> Option<SidecarInfo> {
    let text = decode_text_bytes(bytes);
    let raw: RawInfo = serde_json::from_str(&text).ok()?;
    match raw.version {
        Some(Scalar::Int(INFO_SCHEMA_VERSION)) => {}
        _ => return None,
    }

    Some(SidecarInfo {
        title: text_field(raw.title),
        artist: text_field(raw.artist),
        album: text_field(raw.album),
        album_artist: text_field(raw.album_artist),
        track_no: number_field(raw.track_number).or_else(|| number_field(raw.track)),
        disc_no: number_field(raw.disc_number).or_else(|| number_field(raw.disc)),
        year: year_field(raw.year),
        lyrics: lyrics_field(raw.lyrics),
        synced_lyrics: lyrics_field(raw.synced_lyrics),
    })
}

fn text_field(value: Option<Scalar>) -> Option<String> {
    match value? {
        Scalar::Text(text) => clean_text(&text),
        _ => None,
    }
}

fn lyrics_field(value: Option<Scalar>) -> Option<String> {
    match value? {
        Scalar::Text(text) => clean_lyrics(&text),
        _ => None,
    }
}

fn number_field(value: Option<Scalar>) -> Option<String> {
    match value? {
        Scalar::Int(n) if n > 0 => Some(n.to_string()),
        Scalar::Float(n) if n.is_finite() && n >= 1.0 && n.fract() == 0.0 => {
            Some((n as i64).to_string())
        }
        Scalar::Text(text) => clean_text(&text),
        _ => None,
    }
}

fn year_field(value: Option<Scalar>) -> Option<i32> {
    match value? {
        Scalar::Int(n) => i32::try_from(n).ok().filter(|year| *year > 0),
        Scalar::Text(text) => crate::parse_year(&text),
        _ => None,
    }
}
