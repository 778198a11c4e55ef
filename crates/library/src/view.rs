use std::collections::HashMap;

use crate::mapping::MappingIndex;
use crate::scan::AudioEntry;
use crate::store::TrackMetaRecord;

/// Release position supplied by the mapping table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappedRelease {
    pub album_title: String,
    pub track: Option<u32>,
}

/// Display-ready snapshot of one track. `index` is its position in the scan.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackView {
    pub index: usize,
    pub id: usize,
    pub path: String,
    pub file_name: String,
    pub dir: String,
    pub display_title: String,
    pub display_artist: Option<String>,
    pub album_title: Option<String>,
    /// Album name from tags or sidecars, ignoring the mapping table.
    pub tag_album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub cover_url: Option<String>,
    pub track_no_raw: Option<String>,
    pub disc_no_raw: Option<String>,
    pub lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
    pub mapping: Option<MappedRelease>,
}

/// Borrowed inputs of [`build_track_views`].
#[derive(Clone, Copy)]
pub struct ViewSources<'a> {
    pub entries: &'a [AudioEntry],
    pub meta: &'a HashMap<String, TrackMetaRecord>,
    pub mapping: &'a MappingIndex,
    pub track_art: &'a HashMap<String, String>,
    pub dir_covers: &'a HashMap<String, Option<String>>,
}

/// One view per entry, in scan order.
///
/// Each field resolves mapping row first, then the meta record, then the
/// file name (title) or nothing. The artist falls back to the album artist.
pub fn build_track_views(sources: ViewSources<'_>) -> Vec<TrackView> {
    sources
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| build_view(&sources, index, entry))
        .collect()
}

fn build_view(sources: &ViewSources<'_>, index: usize, entry: &AudioEntry) -> TrackView {
    let record = sources.meta.get(&entry.path);
    let row = sources.mapping.lookup_path(&entry.path);
    let dir = entry.dir().to_string();

    let meta_title = record
        .filter(|record| record.has_title())
        .and_then(|record| record.title.clone());
    let display_title = row
        .map(|row| row.title.clone())
        .or(meta_title)
        .unwrap_or_else(|| entry.file_name.clone());

    let field = |get: fn(&TrackMetaRecord) -> &Option<String>| {
        record.and_then(|record| non_blank(get(record)))
    };
    let tag_album = field(|r| &r.album);
    let display_artist = row
        .and_then(|row| row.original_artist.clone())
        .or_else(|| field(|r| &r.artist))
        .or_else(|| field(|r| &r.album_artist));
    let album_title = row
        .map(|row| row.album_title.clone())
        .or_else(|| tag_album.clone());

    let cover_url = sources
        .track_art
        .get(&entry.path)
        .cloned()
        .or_else(|| sources.dir_covers.get(&dir).cloned().flatten());

    TrackView {
        index,
        id: entry.id,
        path: entry.path.clone(),
        file_name: entry.file_name.clone(),
        dir,
        display_title,
        display_artist,
        album_title,
        tag_album,
        album_artist: field(|r| &r.album_artist),
        year: record.and_then(|record| record.year),
        cover_url,
        track_no_raw: field(|r| &r.track_no),
        disc_no_raw: field(|r| &r.disc_no),
        lyrics: field(|r| &r.lyrics),
        synced_lyrics: field(|r| &r.synced_lyrics),
        mapping: row.map(|row| MappedRelease {
            album_title: row.album_title.clone(),
            track: row.track,
        }),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::store::MetaPatch;

    fn entry(id: usize, path: &str) -> AudioEntry {
        AudioEntry {
            id,
            path: path.to_string(),
            file_name: common::basename(path).to_string(),
            file: PathBuf::from(path),
            lyrics_file: None,
            info_file: None,
            image_file: None,
        }
    }

    #[test]
    fn mapping_overrides_tag_values() {
        let entries = vec![entry(1, "misc/5396e324_anything.mp3")];
        let mut meta = HashMap::new();
        let mut record = TrackMetaRecord::new("5396e324_anything.mp3");
        record.merge(MetaPatch {
            title: Some("Wrong Title".to_string()),
            artist: Some("Tag Artist".to_string()),
            album: Some("Tag Album".to_string()),
            ..MetaPatch::default()
        });
        meta.insert(entries[0].path.clone(), record);
        let mapping = MappingIndex::parse("5396e324\tFantia 2022-05\t10\tSong A\tOriginal\n");

        let views = build_track_views(ViewSources {
            entries: &entries,
            meta: &meta,
            mapping: &mapping,
            track_art: &HashMap::new(),
            dir_covers: &HashMap::new(),
        });
        let view = &views[0];
        assert_eq!(view.display_title, "Song A");
        assert_eq!(view.display_artist.as_deref(), Some("Original"));
        assert_eq!(view.album_title.as_deref(), Some("Fantia 2022-05"));
        assert_eq!(view.tag_album.as_deref(), Some("Tag Album"));
        assert_eq!(
            view.mapping,
            Some(MappedRelease {
                album_title: "Fantia 2022-05".to_string(),
                track: Some(10),
            })
        );
    }

    #[test]
    fn falls_back_to_file_name_and_folder_cover() {
        let entries = vec![entry(1, "A/01 Intro.mp3"), entry(2, "A/02 Body.mp3")];
        let mut meta = HashMap::new();
        meta.insert(entries[0].path.clone(), TrackMetaRecord::new("01 Intro.mp3"));
        let mut track_art = HashMap::new();
        track_art.insert("A/02 Body.mp3".to_string(), "artwork://2/b".to_string());
        let mut dir_covers = HashMap::new();
        dir_covers.insert("A".to_string(), Some("artwork://1/a".to_string()));

        let views = build_track_views(ViewSources {
            entries: &entries,
            meta: &meta,
            mapping: &MappingIndex::default(),
            track_art: &track_art,
            dir_covers: &dir_covers,
        });
        assert_eq!(views[0].index, 0);
        assert_eq!(views[1].index, 1);
        assert_eq!(views[0].display_title, "01 Intro.mp3");
        assert_eq!(views[0].display_artist, None);
        assert_eq!(views[0].cover_url.as_deref(), Some("artwork://1/a"));
        assert_eq!(views[1].cover_url.as_deref(), Some("artwork://2/b"));
        assert_eq!(views[1].display_title, "02 Body.mp3");
    }

    #[test]
    fn album_artist_only_shows_when_artist_is_missing() {
        let entries = vec![entry(1, "A/1.mp3"), entry(2, "A/2.mp3")];
        let mut meta = HashMap::new();
        let mut only_album_artist = TrackMetaRecord::new("1.mp3");
        only_album_artist.merge(MetaPatch {
            album_artist: Some("Various Artists".to_string()),
            ..MetaPatch::default()
        });
        let mut both = TrackMetaRecord::new("2.mp3");
        both.merge(MetaPatch {
            artist: Some("Singer".to_string()),
            album_artist: Some("Various Artists".to_string()),
            ..MetaPatch::default()
        });
        meta.insert(entries[0].path.clone(), only_album_artist);
        meta.insert(entries[1].path.clone(), both);

        let views = build_track_views(ViewSources {
            entries: &entries,
            meta: &meta,
            mapping: &MappingIndex::default(),
            track_art: &HashMap::new(),
            dir_covers: &HashMap::new(),
        });
        assert_eq!(views[0].display_artist.as_deref(), Some("Various Artists"));
        assert_eq!(views[1].display_artist.as_deref(), Some("Singer"));
        assert_eq!(meta["A/1.mp3"].artist, None);
    }
}
