use std::cmp::Ordering;
use std::collections::HashMap;

use crate::collate::collate;
use crate::view::TrackView;

/// Grouping source, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlbumKind {
    Mapping,
    Tag,
    Dir,
}

impl AlbumKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlbumKind::Mapping => "map",
            AlbumKind::Tag => "tag",
            AlbumKind::Dir => "dir",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlbumView {
    pub key: String,
    pub kind: AlbumKind,
    pub dir: Option<String>,
    pub title: String,
    pub cover_url: Option<String>,
    /// Sorted tracks paired with their index in the track view list.
    pub tracks: Vec<(TrackView, usize)>,
}

impl AlbumView {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.tracks.iter().map(|(_, index)| *index)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupingOptions {
    /// Group tracks with a mapping row under the mapped release.
    pub mapping_groups: bool,
}

/// Collapses whitespace and drops NUL bytes. Blank titles are `None`.
pub fn normalize_album_title(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|ch| *ch != '\0').collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// `"5"` and `"5/12"` parse as 5; anything else is `None`.
pub fn parse_track_number(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    let head = match raw.split_once('/') {
        Some((head, _)) => head.trim(),
        None => raw,
    };
    head.parse().ok()
}

/// Buckets views into albums and sorts both the albums and their tracks.
pub fn group_albums(
    views: &[TrackView],
    dir_covers: &HashMap<String, Option<String>>,
    root_name: &str,
    options: GroupingOptions,
) -> Vec<AlbumView> {
    let mut albums: Vec<AlbumView> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (index, view) in views.iter().enumerate() {
        let (key, kind, title, dir) = album_identity(view, root_name, options);
        let slot = match by_key.get(&key) {
            Some(slot) => *slot,
            None => {
                by_key.insert(key.clone(), albums.len());
                albums.push(AlbumView {
                    key,
                    kind,
                    dir,
                    title,
                    cover_url: None,
                    tracks: Vec::new(),
                });
                albums.len() - 1
            }
        };
        albums[slot].tracks.push((view.clone(), index));
    }

    for album in &mut albums {
        sort_album_tracks(&mut album.tracks, options);
        let dir_cover = match (album.kind, album.dir.as_ref()) {
            (AlbumKind::Dir, Some(dir)) => dir_covers.get(dir).cloned().flatten(),
            _ => None,
        };
        album.cover_url = dir_cover.or_else(|| {
            album
                .tracks
                .first()
                .and_then(|(view, _)| view.cover_url.clone())
        });
    }

    albums.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| collate(&a.title, &b.title))
            .then_with(|| a.key.cmp(&b.key))
    });
    albums
}

fn album_identity(
    view: &TrackView,
    root_name: &str,
    options: GroupingOptions,
) -> (String, AlbumKind, String, Option<String>) {
    if options.mapping_groups {
        if let Some(title) = view
            .mapping
            .as_ref()
            .and_then(|release| normalize_album_title(&release.album_title))
        {
            let key = format!("map:{}", title.to_lowercase());
            return (key, AlbumKind::Mapping, title, None);
        }
    }
    if let Some(title) = view.tag_album.as_deref().and_then(normalize_album_title) {
        let key = format!("tag:{}", title.to_lowercase());
        return (key, AlbumKind::Tag, title, None);
    }
    let title = if view.dir.is_empty() {
        format!("{} (root)", root_name)
    } else {
        view.dir.clone()
    };
    (format!("dir:{}", view.dir), AlbumKind::Dir, title, Some(view.dir.clone()))
}

/// Stable sort by rank, then the rank's keys, then scan index.
pub fn sort_album_tracks(tracks: &mut [(TrackView, usize)], options: GroupingOptions) {
    tracks.sort_by(|(a, a_index), (b, b_index)| {
        compare_tracks(a, b, options).then_with(|| a_index.cmp(b_index))
    });
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortRank {
    Release { track: Option<u32> },
    Numbered { disc: u32, track: Option<u32> },
    ByName,
}

impl SortRank {
    fn tier(self) -> u8 {
        match self {
            SortRank::Release { .. } => 0,
            SortRank::Numbered { .. } => 1,
            SortRank::ByName => 2,
        }
    }
}

fn sort_rank(view: &TrackView, options: GroupingOptions) -> SortRank {
    if options.mapping_groups {
        if let Some(release) = view.mapping.as_ref() {
            return SortRank::Release {
                track: release.track,
            };
        }
    }
    let disc = parse_track_number(view.disc_no_raw.as_deref());
    let track = parse_track_number(view.track_no_raw.as_deref());
    if disc.is_none() && track.is_none() {
        return SortRank::ByName;
    }
    SortRank::Numbered {
        disc: disc.unwrap_or(1),
        track,
    }
}

/// Missing numbers sort after present ones.
fn compare_numbers(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders two tracks of one album without the scan-index tie-break.
pub fn compare_tracks(a: &TrackView, b: &TrackView, options: GroupingOptions) -> Ordering {
    let (rank_a, rank_b) = (sort_rank(a, options), sort_rank(b, options));
    match (rank_a, rank_b) {
        (SortRank::Release { track: ta }, SortRank::Release { track: tb }) => compare_numbers(ta, tb),
        (
            SortRank::Numbered { disc: da, track: ta },
            SortRank::Numbered { disc: db, track: tb },
        ) => da.cmp(&db).then_with(|| compare_numbers(ta, tb)),
        (SortRank::ByName, SortRank::ByName) => collate(&a.file_name, &b.file_name),
        _ => rank_a.tier().cmp(&rank_b.tier()),
    }
}
