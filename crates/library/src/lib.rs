use std::path::PathBuf;

pub mod album;
pub mod artwork;
pub mod builder;
pub mod collate;
pub mod config;
pub mod covers;
pub mod enrich;
pub mod lyrics;
pub mod mapping;
pub mod queue;
pub mod scan;
pub mod store;
pub mod view;

pub use album::{group_albums, AlbumKind, AlbumView, GroupingOptions};
pub use artwork::{Artwork, ArtworkPool};
pub use builder::{EnrichHandle, LibraryBuilder, PlaybackMode};
pub use config::{config_path_from_env, ConfigError, LibraryConfig};
pub use enrich::{EnrichSummary, Enricher, LoftyTagReader, PassReport, TagReader};
pub use lyrics::{LyricsIndex, LyricsLibrary, LyricsRule};
pub use mapping::{MappingIndex, MappingRow};
pub use queue::{build_queue, next_in_queue, previous_in_queue};
pub use scan::{scan_tree, AudioEntry, ScanOutput};
pub use store::{LibraryStore, MetaPatch, RunToken, TrackMetaRecord};
pub use view::{build_track_views, MappedRelease, TrackView, ViewSources};

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Walk(walkdir::Error),
    Config(ConfigError),
    NotADirectory(PathBuf),
    Write { path: PathBuf, message: String },
    Join(String),
    NoFolder,
    Superseded,
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Walk(err) => write!(f, "could not read folder: {}", err),
            LibraryError::Config(err) => write!(f, "config error: {}", err),
            LibraryError::NotADirectory(path) => {
                write!(f, "{} is not a folder", path.display())
            }
            LibraryError::Write { path, message } => {
                write!(f, "could not save {}: {}", path.display(), message)
            }
            LibraryError::Join(message) => write!(f, "background task failed: {}", message),
            LibraryError::NoFolder => write!(f, "no music folder is open"),
            LibraryError::Superseded => write!(f, "folder was replaced before loading finished"),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<walkdir::Error> for LibraryError {
    fn from(err: walkdir::Error) -> Self {
        LibraryError::Walk(err)
    }
}

impl From<ConfigError> for LibraryError {
    fn from(err: ConfigError) -> Self {
        LibraryError::Config(err)
    }
}

impl From<tokio::task::JoinError> for LibraryError {
    fn from(err: tokio::task::JoinError) -> Self {
        LibraryError::Join(err.to_string())
    }
}
