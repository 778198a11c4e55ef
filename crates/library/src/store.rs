use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metadata::{CoverArt, SidecarInfo, TagInfo};
use parking_lot::RwLock;
use tracing::debug;

use crate::artwork::ArtworkPool;
use crate::scan::AudioEntry;

/// Generation captured by a background worker when it starts.
///
/// Once the store is reset the token is retired and every guarded write made
/// with it becomes a no-op.
#[derive(Clone, Debug)]
pub struct RunToken {
    id: u64,
    current: Arc<AtomicU64>,
}

impl RunToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

/// Progressively filled metadata for one track, keyed by path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMetaRecord {
    pub file_name: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_no: Option<String>,
    pub disc_no: Option<String>,
    pub year: Option<i32>,
    pub picture: Option<Arc<CoverArt>>,
    pub lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

/// Values one source offers for a record. Only empty fields accept them.
#[derive(Clone, Debug, Default)]
pub struct MetaPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_no: Option<String>,
    pub disc_no: Option<String>,
    pub year: Option<i32>,
    pub picture: Option<Arc<CoverArt>>,
    pub lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

impl MetaPatch {
    pub fn lyrics(text: String) -> Self {
        Self {
            lyrics: Some(text),
            ..Self::default()
        }
    }
}

impl From<TagInfo> for MetaPatch {
    fn from(info: TagInfo) -> Self {
        Self {
            title: info.title,
            artist: info.artist,
            album: info.album,
            album_artist: info.album_artist,
            track_no: info.track_no,
            disc_no: info.disc_no,
            year: info.year,
            picture: info.picture.map(Arc::new),
            lyrics: info.lyrics,
            synced_lyrics: info.synced_lyrics,
        }
    }
}

impl From<SidecarInfo> for MetaPatch {
    fn from(info: SidecarInfo) -> Self {
        Self {
            title: info.title,
            artist: info.artist,
            album: info.album,
            album_artist: info.album_artist,
            track_no: info.track_no,
            disc_no: info.disc_no,
            year: info.year,
            picture: None,
            lyrics: info.lyrics,
            synced_lyrics: info.synced_lyrics,
        }
    }
}

impl TrackMetaRecord {
    /// Defaults used at scan time: the title is the file name.
    pub fn new(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            title: Some(file_name.to_string()),
            ..Self::default()
        }
    }

    /// True when the title came from a metadata source rather than the file name.
    pub fn has_title(&self) -> bool {
        match self.title.as_deref() {
            Some(title) => !title.trim().is_empty() && title != self.file_name,
            None => false,
        }
    }

    /// Fills empty fields from `patch`; populated fields never change.
    pub fn merge(&mut self, patch: MetaPatch) -> bool {
        let mut changed = false;
        if !self.has_title() {
            if let Some(title) = patch.title.filter(|value| !value.trim().is_empty()) {
                if self.title.as_deref() != Some(title.as_str()) {
                    self.title = Some(title);
                    changed = true;
                }
            }
        }
        changed |= fill_text(&mut self.artist, patch.artist);
        changed |= fill_text(&mut self.album, patch.album);
        changed |= fill_text(&mut self.album_artist, patch.album_artist);
        changed |= fill_text(&mut self.track_no, patch.track_no);
        changed |= fill_text(&mut self.disc_no, patch.disc_no);
        changed |= fill(&mut self.year, patch.year);
        changed |= fill(&mut self.picture, patch.picture);
        changed |= fill_text(&mut self.lyrics, patch.lyrics);
        changed |= fill_text(&mut self.synced_lyrics, patch.synced_lyrics);
        changed
    }
}

fn fill_text(slot: &mut Option<String>, value: Option<String>) -> bool {
    let empty = slot.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    if !empty {
        return false;
    }
    match value.filter(|v| !v.trim().is_empty()) {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_some() || value.is_none() {
        return false;
    }
    *slot = value;
    true
}

#[derive(Default)]
struct StoreState {
    meta: HashMap<String, TrackMetaRecord>,
    dir_covers: HashMap<String, Option<String>>,
    track_art: HashMap<String, String>,
}

/// Owner of the per-session tables that background workers fill in.
///
/// Writers never hold a reference into a table: each write is a function of
/// the latest value, applied under the lock after re-checking the run token.
#[derive(Default)]
pub struct LibraryStore {
    generation: Arc<AtomicU64>,
    state: RwLock<StoreState>,
    artwork: ArtworkPool,
}

impl LibraryStore {
    pub fn new(artwork: ArtworkPool) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            state: RwLock::new(StoreState::default()),
            artwork,
        }
    }

    pub fn artwork(&self) -> &ArtworkPool {
        &self.artwork
    }

    pub fn current(&self) -> RunToken {
        RunToken {
            id: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
        }
    }

    /// Retires every outstanding token, drops all tables and revokes their URLs.
    pub fn reset(&self) -> RunToken {
        let mut state = self.state.write();
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let old = std::mem::take(&mut *state);
        drop(state);

        let mut revoked = 0usize;
        for url in old.dir_covers.into_values().flatten() {
            if self.artwork.revoke(&url) {
                revoked += 1;
            }
        }
        for url in old.track_art.into_values() {
            if self.artwork.revoke(&url) {
                revoked += 1;
            }
        }
        debug!("Library store reset to run {} ({} artwork URLs revoked)", id, revoked);

        RunToken {
            id,
            current: Arc::clone(&self.generation),
        }
    }

    /// Installs default records for a fresh scan.
    pub fn seed(&self, token: &RunToken, entries: &[AudioEntry]) -> bool {
        let mut state = self.state.write();
        if !token.is_current() {
            return false;
        }
        state.meta = entries
            .iter()
            .map(|entry| (entry.path.clone(), TrackMetaRecord::new(&entry.file_name)))
            .collect();
        true
    }

    pub fn update_meta<F>(&self, token: &RunToken, path: &str, update: F) -> bool
    where
        F: FnOnce(&mut TrackMetaRecord) -> bool,
    {
        let mut state = self.state.write();
        if !token.is_current() {
            return false;
        }
        match state.meta.get_mut(path) {
            Some(record) => update(record),
            None => false,
        }
    }

    pub fn merge_meta(&self, token: &RunToken, path: &str, patch: MetaPatch) -> bool {
        self.update_meta(token, path, |record| record.merge(patch))
    }

    /// First cover published for a directory wins; rejected URLs are revoked.
    pub fn publish_dir_cover(&self, token: &RunToken, dir: &str, url: Option<String>) -> bool {
        let accepted = {
            let mut state = self.state.write();
            if !token.is_current() || state.dir_covers.contains_key(dir) {
                false
            } else {
                state.dir_covers.insert(dir.to_string(), url.clone());
                url.is_some()
            }
        };
        if !accepted {
            if let Some(url) = url {
                self.artwork.revoke(&url);
            }
        }
        accepted
    }

    /// Replaces a directory cover after an explicit user action.
    pub fn replace_dir_cover(&self, token: &RunToken, dir: &str, url: String) -> bool {
        let previous = {
            let mut state = self.state.write();
            if !token.is_current() {
                None
            } else {
                Some(state.dir_covers.insert(dir.to_string(), Some(url.clone())))
            }
        };
        match previous {
            Some(old) => {
                if let Some(old) = old.flatten() {
                    self.artwork.revoke(&old);
                }
                true
            }
            None => {
                self.artwork.revoke(&url);
                false
            }
        }
    }

    /// First artwork published for a track wins; rejected URLs are revoked.
    pub fn publish_track_art(&self, token: &RunToken, path: &str, url: String) -> bool {
        let accepted = {
            let mut state = self.state.write();
            if !token.is_current() || state.track_art.contains_key(path) {
                false
            } else {
                state.track_art.insert(path.to_string(), url.clone());
                true
            }
        };
        if !accepted {
            self.artwork.revoke(&url);
        }
        accepted
    }

    pub fn meta(&self, path: &str) -> Option<TrackMetaRecord> {
        self.state.read().meta.get(path).cloned()
    }

    pub fn has_track_art(&self, path: &str) -> bool {
        self.state.read().track_art.contains_key(path)
    }

    pub fn meta_table(&self) -> HashMap<String, TrackMetaRecord> {
        self.state.read().meta.clone()
    }

    pub fn dir_covers(&self) -> HashMap<String, Option<String>> {
        self.state.read().dir_covers.clone()
    }

    pub fn track_art(&self) -> HashMap<String, String> {
        self.state.read().track_art.clone()
    }
}
