use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metadata::{clean_lyrics, decode_text_bytes, parse_info_sidecar, MetadataError, TagInfo};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::covers::{image_mime, run_cover_pass};
use crate::mapping::MappingIndex;
use crate::scan::{AudioEntry, ScanOutput};
use crate::store::{LibraryStore, MetaPatch, RunToken};

pub const DEFAULT_LANES: usize = 2;

/// Source of embedded tags. Blocking; called from `spawn_blocking`.
pub trait TagReader: Send + Sync + 'static {
    fn read_tags(&self, path: &Path) -> Result<TagInfo, MetadataError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_tags(&self, path: &Path) -> Result<TagInfo, MetadataError> {
        metadata::read_tags(path)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl PassReport {
    fn record(&mut self, outcome: Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Unchanged => {}
        }
    }

    fn absorb(&mut self, other: PassReport) {
        self.processed += other.processed;
        self.updated += other.updated;
        self.failed += other.failed;
        self.cancelled |= other.cancelled;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub tags: PassReport,
    pub lyrics: PassReport,
    pub info: PassReport,
    pub covers: usize,
}

impl EnrichSummary {
    pub fn cancelled(&self) -> bool {
        self.tags.cancelled || self.lyrics.cancelled || self.info.cancelled
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Updated,
    Unchanged,
    Failed,
}

impl Outcome {
    fn from_changed(changed: bool) -> Self {
        if changed {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        }
    }
}

/// Background passes that fill gaps in the meta store for one scan.
///
/// Tags run first, then lyrics text files, then info JSON files; the cover
/// pass runs alongside them. Every write is a fill-if-empty merge, so the pass
/// order alone decides which source wins a field.
#[derive(Clone)]
pub struct Enricher {
    store: Arc<LibraryStore>,
    mapping: Arc<MappingIndex>,
    tags: Arc<dyn TagReader>,
    lanes: usize,
    cover_lanes: usize,
}

impl Enricher {
    pub fn new(store: Arc<LibraryStore>, mapping: Arc<MappingIndex>, tags: Arc<dyn TagReader>) -> Self {
        Self {
            store,
            mapping,
            tags,
            lanes: DEFAULT_LANES,
            cover_lanes: DEFAULT_LANES,
        }
    }

    pub fn with_lanes(mut self, lanes: usize, cover_lanes: usize) -> Self {
        self.lanes = lanes.max(1);
        self.cover_lanes = cover_lanes.max(1);
        self
    }

    pub async fn run(&self, token: RunToken, scan: Arc<ScanOutput>) -> EnrichSummary {
        info!(
            "Enrichment run {} started for {} tracks",
            token.id(),
            scan.entries.len()
        );
        let passes = async {
            let tags = self.run_tag_pass(&token, &scan.entries).await;
            let lyrics = self.run_lyrics_pass(&token, &scan.entries).await;
            let info = self.run_info_pass(&token, &scan.entries).await;
            (tags, lyrics, info)
        };
        let covers = run_cover_pass(
            Arc::clone(&self.store),
            token.clone(),
            Arc::clone(&scan),
            self.cover_lanes,
        );
        let ((tags, lyrics, info), covers) = tokio::join!(passes, covers);

        let summary = EnrichSummary {
            tags,
            lyrics,
            info,
            covers,
        };
        if summary.cancelled() {
            debug!("Enrichment run {} superseded", token.id());
        } else {
            info!(
                "Enrichment run {} finished: tags {}/{}, lyrics {}, info {}, covers {}",
                token.id(),
                tags.updated,
                tags.processed,
                lyrics.updated,
                info.updated,
                covers
            );
        }
        summary
    }

    /// Embedded tags. Tracks carrying a mapping prefix are read last.
    pub async fn run_tag_pass(&self, token: &RunToken, entries: &[AudioEntry]) -> PassReport {
        let (deferred, immediate): (Vec<AudioEntry>, Vec<AudioEntry>) = entries
            .iter()
            .cloned()
            .partition(|entry| self.mapping.lookup_path(&entry.path).is_some());

        let mut report = self.tag_lanes(token, immediate).await;
        if !deferred.is_empty() && token.is_current() {
            debug!("Reading tags of {} mapped tracks", deferred.len());
            report.absorb(self.tag_lanes(token, deferred).await);
        }
        report
    }

    async fn tag_lanes(&self, token: &RunToken, entries: Vec<AudioEntry>) -> PassReport {
        let store = Arc::clone(&self.store);
        let reader = Arc::clone(&self.tags);
        run_lanes("tag", token, entries, self.lanes, move |token, entry| {
            read_tag_entry(Arc::clone(&store), Arc::clone(&reader), token, entry)
        })
        .await
    }

    /// Same-stem `.txt` files. Only the plain `lyrics` field is filled.
    pub async fn run_lyrics_pass(&self, token: &RunToken, entries: &[AudioEntry]) -> PassReport {
        let pending: Vec<AudioEntry> = entries
            .iter()
            .filter(|entry| entry.lyrics_file.is_some())
            .cloned()
            .collect();
        let store = Arc::clone(&self.store);
        run_lanes("lyrics", token, pending, self.lanes, move |token, entry| {
            read_lyrics_entry(Arc::clone(&store), token, entry)
        })
        .await
    }

    /// Same-stem `.json` files, plus the same-stem image as fallback track art.
    pub async fn run_info_pass(&self, token: &RunToken, entries: &[AudioEntry]) -> PassReport {
        let pending: Vec<AudioEntry> = entries
            .iter()
            .filter(|entry| entry.info_file.is_some() || entry.image_file.is_some())
            .cloned()
            .collect();
        let store = Arc::clone(&self.store);
        run_lanes("info", token, pending, self.lanes, move |token, entry| {
            read_info_entry(Arc::clone(&store), token, entry)
        })
        .await
    }
}

/// Drains `entries` with `lanes` tasks sharing one cursor.
///
/// Each lane checks the token before taking the next entry and yields after
/// every unit, so a retired run stops after at most one in-flight unit per lane.
async fn run_lanes<F, Fut>(
    label: &'static str,
    token: &RunToken,
    entries: Vec<AudioEntry>,
    lanes: usize,
    unit: F,
) -> PassReport
where
    F: Fn(RunToken, AudioEntry) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    if entries.is_empty() {
        return PassReport {
            cancelled: !token.is_current(),
            ..PassReport::default()
        };
    }

    let entries = Arc::new(entries);
    let unit = Arc::new(unit);
    let cursor = Arc::new(AtomicUsize::new(0));
    let mut set = JoinSet::new();
    for _ in 0..lanes.max(1) {
        let entries = Arc::clone(&entries);
        let unit = Arc::clone(&unit);
        let cursor = Arc::clone(&cursor);
        let token = token.clone();
        set.spawn(async move {
            let mut report = PassReport::default();
            loop {
                if !token.is_current() {
                    break;
                }
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                let entry = match entries.get(idx) {
                    Some(entry) => entry.clone(),
                    None => break,
                };
                report.record(unit(token.clone(), entry).await);
                tokio::task::yield_now().await;
            }
            report
        });
    }

    let mut report = PassReport::default();
    while let Some(result) = set.join_next().await {
        match result {
            Ok(lane) => report.absorb(lane),
            Err(err) => warn!("{} lane failed: {}", label, err),
        }
    }
    report.cancelled = !token.is_current();
    debug!(
        "{} pass: {} processed, {} updated, {} failed",
        label, report.processed, report.updated, report.failed
    );
    report
}

async fn read_tag_entry(
    store: Arc<LibraryStore>,
    reader: Arc<dyn TagReader>,
    token: RunToken,
    entry: AudioEntry,
) -> Outcome {
    let file = entry.file.clone();
    let result = tokio::task::spawn_blocking(move || reader.read_tags(&file)).await;
    let tags = match result {
        Ok(Ok(tags)) => tags,
        Ok(Err(err)) => {
            debug!("Failed to read tags for {}: {}", entry.path, err);
            return Outcome::Failed;
        }
        Err(err) => {
            warn!("Tag reader task for {} failed: {}", entry.path, err);
            return Outcome::Failed;
        }
    };
    if !token.is_current() {
        return Outcome::Unchanged;
    }

    let patch = MetaPatch::from(tags);
    let picture = patch.picture.clone();
    let mut changed = store.merge_meta(&token, &entry.path, patch);
    if let Some(picture) = picture {
        if !store.has_track_art(&entry.path) {
            let url = store
                .artwork()
                .create(picture.data.clone(), picture.mime.clone());
            changed |= store.publish_track_art(&token, &entry.path, url);
        }
    }
    Outcome::from_changed(changed)
}

async fn read_lyrics_entry(store: Arc<LibraryStore>, token: RunToken, entry: AudioEntry) -> Outcome {
    let file = match entry.lyrics_file.as_ref() {
        Some(file) => file,
        None => return Outcome::Unchanged,
    };
    let filled = store
        .meta(&entry.path)
        .and_then(|record| record.lyrics)
        .map(|lyrics| !lyrics.trim().is_empty())
        .unwrap_or(false);
    if filled {
        return Outcome::Unchanged;
    }

    let bytes = match tokio::fs::read(file).await {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("Failed to read lyrics for {}: {}", entry.path, err);
            return Outcome::Failed;
        }
    };
    match clean_lyrics(&decode_text_bytes(&bytes)) {
        Some(lyrics) => {
            Outcome::from_changed(store.merge_meta(&token, &entry.path, MetaPatch::lyrics(lyrics)))
        }
        None => Outcome::Unchanged,
    }
}

async fn read_info_entry(store: Arc<LibraryStore>, token: RunToken, entry: AudioEntry) -> Outcome {
    let mut changed = false;
    let mut failed = false;

    if let Some(file) = entry.info_file.as_ref() {
        match tokio::fs::read(file).await {
            Ok(bytes) => match parse_info_sidecar(&bytes) {
                Some(info) => changed |= store.merge_meta(&token, &entry.path, info.into()),
                None => debug!("Ignoring info sidecar for {}", entry.path),
            },
            Err(err) => {
                debug!("Failed to read info sidecar for {}: {}", entry.path, err);
                failed = true;
            }
        }
    }

    if let Some(file) = entry.image_file.as_ref() {
        if token.is_current() && !store.has_track_art(&entry.path) {
            match tokio::fs::read(file).await {
                Ok(data) => {
                    let mime = image_mime(&data, file);
                    let url = store.artwork().create(data, mime);
                    changed |= store.publish_track_art(&token, &entry.path, url);
                }
                Err(err) => {
                    debug!("Failed to read track image for {}: {}", entry.path, err);
                    failed = true;
                }
            }
        }
    }

    if changed {
        Outcome::Updated
    } else if failed {
        Outcome::Failed
    } else {
        Outcome::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    use metadata::CoverArt;

    use crate::scan::scan_tree;

    #[derive(Default)]
    struct FakeTags {
        by_name: HashMap<String, TagInfo>,
        delay: Option<Duration>,
    }

    impl FakeTags {
        fn with(mut self, name: &str, info: TagInfo) -> Self {
            self.by_name.insert(name.to_string(), info);
            self
        }
    }

    impl TagReader for FakeTags {
        fn read_tags(&self, path: &Path) -> Result<TagInfo, MetadataError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            self.by_name
                .get(&name)
                .cloned()
                .ok_or_else(|| MetadataError::Io(io::Error::new(io::ErrorKind::InvalidData, "no tags")))
        }
    }

    fn write(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    fn titled(title: &str) -> TagInfo {
        TagInfo {
            title: Some(title.to_string()),
            ..TagInfo::default()
        }
    }

    fn prepare(root: &Path) -> (Arc<LibraryStore>, RunToken, Arc<ScanOutput>) {
        let scan = Arc::new(scan_tree(root).unwrap());
        let store = Arc::new(LibraryStore::default());
        let token = store.reset();
        store.seed(&token, &scan.entries);
        (store, token, scan)
    }

    fn enricher(store: &Arc<LibraryStore>, tags: FakeTags) -> Enricher {
        Enricher::new(Arc::clone(store), Arc::new(MappingIndex::default()), Arc::new(tags))
    }

    #[tokio::test]
    async fn embedded_lyrics_beat_the_text_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "song.mp3", b"x");
        write(tmp.path(), "song.txt", b"from sidecar\r\n");
        write(tmp.path(), "other.mp3", b"x");
        write(tmp.path(), "other.txt", "\u{feff}line one\r\nline two\r\n".as_bytes());
        let (store, token, scan) = prepare(tmp.path());

        let tags = FakeTags::default().with(
            "song.mp3",
            TagInfo {
                lyrics: Some("from tags".to_string()),
                ..TagInfo::default()
            },
        );
        let summary = enricher(&store, tags).run(token, scan).await;
        assert!(!summary.cancelled());
        assert_eq!(summary.tags.failed, 1);
        assert_eq!(summary.lyrics.processed, 2);

        assert_eq!(store.meta("song.mp3").unwrap().lyrics.as_deref(), Some("from tags"));
        assert_eq!(
            store.meta("other.mp3").unwrap().lyrics.as_deref(),
            Some("line one\nline two")
        );
    }

    #[tokio::test]
    async fn info_sidecar_only_fills_gaps() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "A/01.mp3", b"x");
        write(
            tmp.path(),
            "A/01.json",
            br#"{"version":1,"title":"Sidecar Title","album":"Sidecar Album","track":"4/9"}"#,
        );
        write(tmp.path(), "A/02.mp3", b"x");
        write(tmp.path(), "A/02.json", br#"{"version":2,"title":"Future"}"#);
        let (store, token, scan) = prepare(tmp.path());

        let tags = FakeTags::default().with("01.mp3", titled("Tag Title"));
        enricher(&store, tags).run(token, scan).await;

        let first = store.meta("A/01.mp3").unwrap();
        assert_eq!(first.title.as_deref(), Some("Tag Title"));
        assert_eq!(first.album.as_deref(), Some("Sidecar Album"));
        assert_eq!(first.track_no.as_deref(), Some("4/9"));

        let second = store.meta("A/02.mp3").unwrap();
        assert_eq!(second.title.as_deref(), Some("02.mp3"));
        assert!(!second.has_title());
    }

    #[tokio::test]
    async fn sidecar_artist_fills_a_track_with_only_an_album_artist() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "comp.mp3", b"x");
        write(tmp.path(), "comp.json", br#"{"version":1,"artist":"Real Artist"}"#);
        let (store, token, scan) = prepare(tmp.path());

        let tags = FakeTags::default().with(
            "comp.mp3",
            TagInfo {
                album_artist: Some("Various Artists".to_string()),
                ..TagInfo::default()
            },
        );
        enricher(&store, tags).run(token, scan).await;

        let record = store.meta("comp.mp3").unwrap();
        assert_eq!(record.artist.as_deref(), Some("Real Artist"));
        assert_eq!(record.album_artist.as_deref(), Some("Various Artists"));
    }

    #[tokio::test]
    async fn passes_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.mp3", b"x");
        write(tmp.path(), "a.txt", b"words");
        write(tmp.path(), "a.json", br#"{"version":1,"album":"Sidecar"}"#);
        write(tmp.path(), "b.flac", b"x");
        let (store, token, scan) = prepare(tmp.path());

        let tags = FakeTags::default()
            .with("a.mp3", titled("A"))
            .with("b.flac", titled("B"));
        let enricher = enricher(&store, tags);
        enricher.run(token.clone(), Arc::clone(&scan)).await;
        let once = store.meta_table();

        let again = enricher.run_tag_pass(&token, &scan.entries).await;
        let lyrics = enricher.run_lyrics_pass(&token, &scan.entries).await;
        let info = enricher.run_info_pass(&token, &scan.entries).await;
        assert_eq!(again.updated, 0);
        assert_eq!(lyrics.updated, 0);
        assert_eq!(info.processed, 1);
        assert_eq!(info.updated, 0);
        assert_eq!(once["a.mp3"].album.as_deref(), Some("Sidecar"));
        assert_eq!(store.meta_table(), once);
    }

    #[tokio::test]
    async fn mapped_tracks_are_still_tagged() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "misc/5396e324_anything.mp3", b"x");
        write(tmp.path(), "misc/plain.mp3", b"x");
        let (store, token, scan) = prepare(tmp.path());

        let mapping = MappingIndex::parse("5396e324\tFantia 2022-05\t10\tSong A\tOriginal\n");
        let tags = FakeTags::default()
            .with("5396e324_anything.mp3", titled("Wrong Title"))
            .with("plain.mp3", titled("Plain"));
        let enricher = Enricher::new(Arc::clone(&store), Arc::new(mapping), Arc::new(tags));
        let report = enricher.run_tag_pass(&token, &scan.entries).await;

        assert_eq!(report.processed, 2);
        assert_eq!(report.updated, 2);
        assert_eq!(
            store.meta("misc/5396e324_anything.mp3").unwrap().title.as_deref(),
            Some("Wrong Title")
        );
    }

    #[tokio::test]
    async fn embedded_picture_wins_over_same_stem_image() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.mp3", b"x");
        write(tmp.path(), "a.jpg", b"\xFF\xD8\xFFsidecar");
        write(tmp.path(), "b.mp3", b"x");
        write(tmp.path(), "b.png", b"\x89PNGsidecar");
        let (store, token, scan) = prepare(tmp.path());

        let tags = FakeTags::default().with(
            "a.mp3",
            TagInfo {
                picture: Some(CoverArt {
                    data: b"embedded".to_vec(),
                    mime: Some("image/jpeg".to_string()),
                }),
                ..TagInfo::default()
            },
        );
        enricher(&store, tags).run(token, scan).await;

        let art = store.track_art();
        let embedded = store.artwork().get(&art["a.mp3"]).unwrap();
        assert_eq!(embedded.data, b"embedded".to_vec());
        let sidecar = store.artwork().get(&art["b.mp3"]).unwrap();
        assert_eq!(sidecar.mime, "image/png");
        // plus the root folder cover
        assert_eq!(store.artwork().live_count(), art.len() + 1);
    }

    #[tokio::test]
    async fn reset_mid_run_leaves_new_records_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.mp3", b"x");
        write(tmp.path(), "b.mp3", b"x");
        let (store, old_token, scan) = prepare(tmp.path());

        let slow = FakeTags {
            delay: Some(Duration::from_millis(100)),
            ..FakeTags::default()
        }
        .with("a.mp3", titled("Stale A"))
        .with("b.mp3", titled("Stale B"));
        let old_run = {
            let enricher = enricher(&store, slow);
            let scan = Arc::clone(&scan);
            tokio::spawn(async move { enricher.run(old_token, scan).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = store.reset();
        store.seed(&fresh, &scan.entries);

        let summary = old_run.await.unwrap();
        assert!(summary.cancelled());
        assert_eq!(store.meta("a.mp3").unwrap(), crate::TrackMetaRecord::new("a.mp3"));
        assert_eq!(store.meta("b.mp3").unwrap(), crate::TrackMetaRecord::new("b.mp3"));
        assert!(store.track_art().is_empty());
    }
}
