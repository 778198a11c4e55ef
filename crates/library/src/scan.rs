use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use common::{basename, dirname, relpath_from, strip_extension, FileKind};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::LibraryError;

/// One discovered audio file. `id` is 1-based scan order and fixed for the session.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioEntry {
    pub id: usize,
    pub path: String,
    pub file_name: String,
    pub file: PathBuf,
    pub lyrics_file: Option<PathBuf>,
    pub info_file: Option<PathBuf>,
    pub image_file: Option<PathBuf>,
}

impl AudioEntry {
    pub fn dir(&self) -> &str {
        dirname(&self.path)
    }

    /// Position in the scanned list, the identity used by "play at index".
    pub fn index(&self) -> usize {
        self.id - 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleKey {
    pub dir: String,
    pub stem: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BundleFile {
    pub path: String,
    pub file: PathBuf,
}

/// Files sharing a directory and a base name without extension.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SidecarBundle {
    pub audio: Option<BundleFile>,
    pub lyrics: Option<BundleFile>,
    pub image: Option<BundleFile>,
    pub info: Option<BundleFile>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageFile {
    pub path: String,
    pub file_name: String,
    pub file: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ScanOutput {
    pub root: PathBuf,
    pub root_name: String,
    pub entries: Vec<AudioEntry>,
    pub bundles: HashMap<BundleKey, SidecarBundle>,
    /// Every directory visited, in walk order; the root is `""`.
    pub dirs: Vec<String>,
    /// Images per directory, in walk order.
    pub dir_images: HashMap<String, Vec<ImageFile>>,
}

/// Walks `root` and classifies every file by extension.
///
/// Children are visited in file-name order so repeated scans of an unchanged
/// tree yield identical ids. Enumeration errors are returned to the caller.
pub fn scan_tree(root: &Path) -> Result<ScanOutput, LibraryError> {
    let meta = fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(LibraryError::NotADirectory(root.to_path_buf()));
    }

    let root_name = root
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| root.display().to_string());

    let mut order: Vec<BundleKey> = Vec::new();
    let mut bundles: HashMap<BundleKey, SidecarBundle> = HashMap::new();
    let mut dirs: Vec<String> = Vec::new();
    let mut seen_dirs: HashSet<String> = HashSet::new();
    let mut dir_images: HashMap<String, Vec<ImageFile>> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relpath = match relpath_from(root, entry.path()) {
            Some(rel) => rel,
            None => continue,
        };

        if entry.file_type().is_dir() {
            if seen_dirs.insert(relpath.clone()) {
                dirs.push(relpath);
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = basename(&relpath).to_string();
        let kind = match FileKind::of_name(&file_name) {
            Some(kind) => kind,
            None => continue,
        };
        let dir = dirname(&relpath).to_string();
        let key = BundleKey {
            dir: dir.clone(),
            stem: strip_extension(&file_name).to_string(),
        };

        let bundle = bundles.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            SidecarBundle::default()
        });
        let slot = match kind {
            FileKind::Audio => &mut bundle.audio,
            FileKind::Lyrics => &mut bundle.lyrics,
            FileKind::Image => &mut bundle.image,
            FileKind::Info => &mut bundle.info,
        };
        let file = BundleFile {
            path: relpath.clone(),
            file: entry.path().to_path_buf(),
        };
        if let Some(previous) = slot.replace(file) {
            debug!(
                "Bundle {}/{} already had {}; keeping {}",
                key.dir, key.stem, previous.path, relpath
            );
        }

        if kind == FileKind::Image {
            dir_images.entry(dir).or_default().push(ImageFile {
                path: relpath,
                file_name,
                file: entry.path().to_path_buf(),
            });
        }
    }

    let entries: Vec<AudioEntry> = order
        .iter()
        .filter_map(|key| bundles.get(key))
        .filter_map(|bundle| {
            let audio = bundle.audio.as_ref()?;
            Some(AudioEntry {
                id: 0,
                path: audio.path.clone(),
                file_name: basename(&audio.path).to_string(),
                file: audio.file.clone(),
                lyrics_file: bundle.lyrics.as_ref().map(|f| f.file.clone()),
                info_file: bundle.info.as_ref().map(|f| f.file.clone()),
                image_file: bundle.image.as_ref().map(|f| f.file.clone()),
            })
        })
        .enumerate()
        .map(|(idx, mut entry)| {
            entry.id = idx + 1;
            entry
        })
        .collect();

    info!(
        "Scanned {}: {} audio files in {} folders",
        root.display(),
        entries.len(),
        dirs.len()
    );

    Ok(ScanOutput {
        root: root.to_path_buf(),
        root_name,
        entries,
        bundles,
        dirs,
        dir_images,
    })
}
