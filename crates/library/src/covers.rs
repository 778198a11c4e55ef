use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{join_relpath, normalize_stem};
use metadata::guess_mime;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::scan::{ImageFile, ScanOutput};
use crate::store::{LibraryStore, RunToken};
use crate::LibraryError;

const SEPARATORS: &[char] = &[' ', '.', '_', '-'];

/// Number of stem patterns; the last one matches any image.
const PATTERN_COUNT: usize = 6;

/// Index of the first stem pattern that matches, best first.
fn pattern_index(stem: &str) -> usize {
    if word_prefix(stem, "cover") {
        0
    } else if word_prefix(stem, "album") {
        1
    } else if word_prefix(stem, "front") || word_prefix(stem, "jacket") {
        2
    } else if stem == "folder" {
        3
    } else if is_windows_albumart(stem) {
        4
    } else {
        PATTERN_COUNT - 1
    }
}

/// `stem` is `word` alone or `word` followed by a separator and anything.
fn word_prefix(stem: &str, word: &str) -> bool {
    match stem.strip_prefix(word) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATORS),
        None => false,
    }
}

fn is_windows_albumart(stem: &str) -> bool {
    if matches!(stem, "albumart" | "albumartsmall" | "albumartlarge") {
        return true;
    }
    match stem.strip_prefix("albumart_") {
        Some(rest) => rest.ends_with("_large") || rest.ends_with("_small"),
        None => false,
    }
}

pub fn cover_priority(file_name: &str) -> usize {
    pattern_index(&normalize_stem(file_name))
}

/// Best image of one directory. Equal priorities keep the earliest image.
pub fn pick_directory_cover(images: &[ImageFile]) -> Option<&ImageFile> {
    let mut best: Option<(usize, &ImageFile)> = None;
    for image in images {
        let priority = cover_priority(&image.file_name);
        match best {
            Some((best_priority, _)) if priority >= best_priority => {}
            _ => best = Some((priority, image)),
        }
    }
    best.map(|(_, image)| image)
}

/// Resolves one cover per scanned directory and publishes each as it is ready.
///
/// Directories are pulled from a shared cursor by `lanes` tasks. Work stops
/// silently once `token` is retired.
pub async fn run_cover_pass(
    store: Arc<LibraryStore>,
    token: RunToken,
    scan: Arc<ScanOutput>,
    lanes: usize,
) -> usize {
    let cursor = Arc::new(AtomicUsize::new(0));
    let mut set = JoinSet::new();
    for _ in 0..lanes.max(1) {
        let store = Arc::clone(&store);
        let token = token.clone();
        let scan = Arc::clone(&scan);
        let cursor = Arc::clone(&cursor);
        set.spawn(async move {
            let mut published = 0usize;
            loop {
                if !token.is_current() {
                    break;
                }
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                let dir = match scan.dirs.get(idx) {
                    Some(dir) => dir,
                    None => break,
                };
                if publish_dir(&store, &token, &scan, dir).await {
                    published += 1;
                }
                tokio::task::yield_now().await;
            }
            published
        });
    }

    let mut published = 0usize;
    while let Some(result) = set.join_next().await {
        match result {
            Ok(count) => published += count,
            Err(err) => warn!("Cover lane failed: {}", err),
        }
    }
    if token.is_current() {
        info!("Cover pass finished: {} folders with covers", published);
    } else {
        debug!("Cover pass abandoned for run {}", token.id());
    }
    published
}

async fn publish_dir(store: &LibraryStore, token: &RunToken, scan: &ScanOutput, dir: &str) -> bool {
    let best = scan
        .dir_images
        .get(dir)
        .and_then(|images| pick_directory_cover(images));
    let image = match best {
        Some(image) => image,
        None => {
            store.publish_dir_cover(token, dir, None);
            return false;
        }
    };

    let data = match tokio::fs::read(&image.file).await {
        Ok(data) => data,
        Err(err) => {
            debug!("Failed to read cover {}: {}", image.path, err);
            store.publish_dir_cover(token, dir, None);
            return false;
        }
    };
    if !token.is_current() {
        return false;
    }
    let mime = image_mime(&data, &image.file);
    let url = store.artwork().create(data, mime);
    store.publish_dir_cover(token, dir, Some(url))
}

pub fn image_mime(data: &[u8], path: &Path) -> Option<String> {
    guess_mime(data).or_else(|| {
        mime_guess::from_path(path)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.essence_str().to_string())
    })
}

/// Saves `bytes` as `cover.<ext>` inside `dir` (relative to `root`).
/// `dir` must be a plain relative path below `root`.
pub fn write_directory_cover(root: &Path, dir: &str, bytes: &[u8]) -> Result<PathBuf, LibraryError> {
    let plain = Path::new(dir)
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if !plain || dir.contains('\\') {
        return Err(LibraryError::Write {
            path: root.join(dir),
            message: "the folder is outside the music folder".to_string(),
        });
    }
    let ext = match guess_mime(bytes).as_deref() {
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/bmp") => "bmp",
        _ => "jpg",
    };
    let target = join_relpath(root, dir).join(format!("cover.{}", ext));
    fs::write(&target, bytes).map_err(|err| LibraryError::Write {
        path: target.clone(),
        message: describe_write_error(&err),
    })?;
    info!("Saved folder cover {}", target.display());
    Ok(target)
}

fn describe_write_error(err: &std::io::Error) -> String {
    match err.kind() {
        ErrorKind::PermissionDenied => {
            "permission denied; the folder is read-only or access was not granted".to_string()
        }
        ErrorKind::NotFound => "the folder no longer exists".to_string(),
        _ => err.to_string(),
    }
}
