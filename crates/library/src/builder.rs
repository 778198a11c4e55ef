use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::album::{group_albums, AlbumView, GroupingOptions};
use crate::config::{load_or_create_config, resolve_optional, LibraryConfig};
use crate::covers::{image_mime, write_directory_cover};
use crate::enrich::{EnrichSummary, Enricher, LoftyTagReader, TagReader, DEFAULT_LANES};
use crate::lyrics::LyricsLibrary;
use crate::mapping::MappingIndex;
use crate::queue::build_queue;
use crate::scan::{scan_tree, ScanOutput};
use crate::store::{LibraryStore, RunToken};
use crate::view::{build_track_views, TrackView, ViewSources};
use crate::LibraryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaybackMode {
    pub group_by_album: bool,
    pub shuffle: bool,
}

impl Default for PlaybackMode {
    fn default() -> Self {
        Self {
            group_by_album: true,
            shuffle: false,
        }
    }
}

/// Background enrichment of one opened folder.
pub struct EnrichHandle {
    token: RunToken,
    task: JoinHandle<EnrichSummary>,
}

impl EnrichHandle {
    pub fn run_id(&self) -> u64 {
        self.token.id()
    }

    pub fn is_current(&self) -> bool {
        self.token.is_current()
    }

    pub async fn wait(self) -> Result<EnrichSummary, LibraryError> {
        Ok(self.task.await?)
    }
}

/// Coordinates one library session: the open folder, its background passes
/// and the snapshots handed to playback.
pub struct LibraryBuilder {
    store: Arc<LibraryStore>,
    mapping: Arc<MappingIndex>,
    lyrics: Arc<LyricsLibrary>,
    tags: Arc<dyn TagReader>,
    lanes: usize,
    cover_lanes: usize,
    grouping: GroupingOptions,
    playback: RwLock<PlaybackMode>,
    scan: RwLock<Option<Arc<ScanOutput>>>,
}

impl Default for LibraryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(LibraryStore::default()),
            mapping: Arc::new(MappingIndex::default()),
            lyrics: Arc::new(LyricsLibrary::default()),
            tags: Arc::new(LoftyTagReader),
            lanes: DEFAULT_LANES,
            cover_lanes: DEFAULT_LANES,
            grouping: GroupingOptions::default(),
            playback: RwLock::new(PlaybackMode::default()),
            scan: RwLock::new(None),
        }
    }

    /// Applies `config`; relative table paths resolve against `config_path`.
    pub fn from_config(config: &LibraryConfig, config_path: &Path) -> Self {
        let mut builder = Self::new();
        if let Some(path) = resolve_optional(config_path, config.mapping_path.as_deref()) {
            builder.mapping = Arc::new(MappingIndex::load(&path));
        }
        if let Some(path) = resolve_optional(config_path, config.lyrics_index_path.as_deref()) {
            builder.lyrics = Arc::new(LyricsLibrary::load(&path));
        }
        builder.lanes = config.enrich_concurrency.max(1);
        builder.cover_lanes = config.cover_concurrency.max(1);
        builder.grouping = GroupingOptions {
            mapping_groups: config.mapping_groups,
        };
        builder.playback = RwLock::new(PlaybackMode {
            group_by_album: config.group_by_album,
            shuffle: config.shuffle,
        });
        builder
    }

    /// Loads (or creates) the config file and builds from it.
    pub fn from_config_path(config_path: &Path) -> Result<(Self, LibraryConfig), LibraryError> {
        let (config, created) = load_or_create_config(config_path)?;
        if created {
            info!("Wrote default config to {}", config_path.display());
        }
        Ok((Self::from_config(&config, config_path), config))
    }

    pub fn with_tag_reader(mut self, tags: Arc<dyn TagReader>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_mapping(mut self, mapping: MappingIndex) -> Self {
        self.mapping = Arc::new(mapping);
        self
    }

    pub fn with_lyrics(mut self, lyrics: LyricsLibrary) -> Self {
        self.lyrics = Arc::new(lyrics);
        self
    }

    pub fn store(&self) -> &Arc<LibraryStore> {
        &self.store
    }

    pub fn mapping(&self) -> &MappingIndex {
        &self.mapping
    }

    pub fn scan(&self) -> Option<Arc<ScanOutput>> {
        self.scan.read().clone()
    }

    /// Retires every pass of the previous folder, scans `root` and starts
    /// enrichment. Scan errors are returned; enrichment errors never are.
    pub async fn open_folder(&self, root: PathBuf) -> Result<EnrichHandle, LibraryError> {
        let token = self.reset();
        info!("Opening {} as run {}", root.display(), token.id());

        let scan = tokio::task::spawn_blocking(move || scan_tree(&root)).await??;
        let scan = Arc::new(scan);
        if !self.store.seed(&token, &scan.entries) {
            return Err(LibraryError::Superseded);
        }
        {
            let mut guard = self.scan.write();
            if !token.is_current() {
                return Err(LibraryError::Superseded);
            }
            *guard = Some(Arc::clone(&scan));
        }

        let enricher = Enricher::new(
            Arc::clone(&self.store),
            Arc::clone(&self.mapping),
            Arc::clone(&self.tags),
        )
        .with_lanes(self.lanes, self.cover_lanes);
        let run_token = token.clone();
        let task = tokio::spawn(async move { enricher.run(run_token, scan).await });
        Ok(EnrichHandle { token, task })
    }

    /// Drops the open folder; in-flight passes become inert.
    pub fn reset(&self) -> RunToken {
        let mut guard = self.scan.write();
        let token = self.store.reset();
        *guard = None;
        token
    }

    pub fn track_views(&self) -> Vec<TrackView> {
        let scan = match self.scan() {
            Some(scan) => scan,
            None => return Vec::new(),
        };
        let meta = self.store.meta_table();
        let track_art = self.store.track_art();
        let dir_covers = self.store.dir_covers();
        build_track_views(ViewSources {
            entries: &scan.entries,
            meta: &meta,
            mapping: &self.mapping,
            track_art: &track_art,
            dir_covers: &dir_covers,
        })
    }

    pub fn albums(&self) -> Vec<AlbumView> {
        self.albums_for(&self.track_views())
    }

    pub fn albums_for(&self, views: &[TrackView]) -> Vec<AlbumView> {
        let root_name = match self.scan() {
            Some(scan) => scan.root_name.clone(),
            None => return Vec::new(),
        };
        group_albums(views, &self.store.dir_covers(), &root_name, self.grouping)
    }

    pub fn playback_mode(&self) -> PlaybackMode {
        *self.playback.read()
    }

    pub fn set_playback_mode(&self, mode: PlaybackMode) {
        *self.playback.write() = mode;
    }

    pub fn queue<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mode = self.playback_mode();
        let views = self.track_views();
        let albums = if mode.group_by_album {
            self.albums_for(&views)
        } else {
            Vec::new()
        };
        build_queue(views.len(), &albums, mode.group_by_album, mode.shuffle, rng)
    }

    /// Lyrics of the track at `index`, falling back to the lyrics index by title.
    pub async fn lyrics_for(&self, index: usize) -> Option<String> {
        let view = self.track_views().into_iter().nth(index)?;
        if view.lyrics.is_some() {
            return view.lyrics;
        }
        if self.lyrics.is_empty() {
            return None;
        }
        self.lyrics.lyrics_for(&view.display_title).await
    }

    /// Writes `bytes` as the cover image of `dir` and shows it immediately.
    pub async fn save_directory_cover(&self, dir: &str, bytes: Vec<u8>) -> Result<PathBuf, LibraryError> {
        let scan = self.scan().ok_or(LibraryError::NoFolder)?;
        if !scan.dirs.iter().any(|known| known == dir) {
            return Err(LibraryError::Write {
                path: scan.root.join(dir),
                message: "the folder is not part of the open music folder".to_string(),
            });
        }
        let token = self.store.current();

        let root = scan.root.clone();
        let target_dir = dir.to_string();
        let data = bytes.clone();
        let path =
            tokio::task::spawn_blocking(move || write_directory_cover(&root, &target_dir, &data))
                .await??;

        let mime = image_mime(&bytes, &path);
        let url = self.store.artwork().create(bytes, mime);
        if !self.store.replace_dir_cover(&token, dir, url) {
            warn!("Folder changed before the new cover of {} could be shown", dir);
        }
        Ok(path)
    }
}
