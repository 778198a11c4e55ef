use rand::seq::SliceRandom;
use rand::Rng;

use crate::album::AlbumView;

/// Playback order as indices into the track view list.
///
/// With grouping on, albums play in display order; otherwise tracks play in
/// scan order. Shuffle permutes whichever order was chosen.
pub fn build_queue<R: Rng + ?Sized>(
    len: usize,
    albums: &[AlbumView],
    group_by_album: bool,
    shuffle: bool,
    rng: &mut R,
) -> Vec<usize> {
    let mut queue: Vec<usize> = if group_by_album {
        albums
            .iter()
            .flat_map(|album| album.indices())
            .filter(|index| *index < len)
            .collect()
    } else {
        (0..len).collect()
    };
    if shuffle {
        queue.shuffle(rng);
    }
    queue
}

/// Index after `current`, wrapping to the head. Unknown indices start at the head.
pub fn next_in_queue(queue: &[usize], current: Option<usize>) -> Option<usize> {
    let position = current.and_then(|current| queue.iter().position(|index| *index == current));
    match position {
        Some(pos) => queue.get((pos + 1) % queue.len()).copied(),
        None => queue.first().copied(),
    }
}

/// Index before `current`, wrapping to the tail. Unknown indices start at the head.
pub fn previous_in_queue(queue: &[usize], current: Option<usize>) -> Option<usize> {
    let position = current.and_then(|current| queue.iter().position(|index| *index == current));
    match position {
        Some(0) => queue.last().copied(),
        Some(pos) => queue.get(pos - 1).copied(),
        None => queue.first().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::album::{group_albums, GroupingOptions};
    use crate::view::TrackView;

    fn view(index: usize, path: &str, album: Option<&str>) -> TrackView {
        TrackView {
            index,
            id: index + 1,
            path: path.to_string(),
            file_name: common::basename(path).to_string(),
            dir: common::dirname(path).to_string(),
            display_title: path.to_string(),
            display_artist: None,
            album_title: album.map(str::to_string),
            tag_album: album.map(str::to_string),
            album_artist: None,
            year: None,
            cover_url: None,
            track_no_raw: None,
            disc_no_raw: None,
            lyrics: None,
            synced_lyrics: None,
            mapping: None,
        }
    }

    fn albums() -> Vec<AlbumView> {
        let views = vec![
            view(0, "B/2.mp3", None),
            view(1, "B/1.mp3", None),
            view(2, "A/x.mp3", Some("Zeta")),
        ];
        group_albums(&views, &HashMap::new(), "Music", GroupingOptions::default())
    }

    #[test]
    fn grouped_queue_follows_album_order() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(build_queue(3, &albums(), true, false, &mut rng), vec![2, 1, 0]);
        assert_eq!(build_queue(3, &albums(), false, false, &mut rng), vec![0, 1, 2]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut queue = build_queue(50, &[], false, true, &mut rng);
        assert_eq!(queue.len(), 50);
        queue.sort_unstable();
        assert_eq!(queue, (0..50).collect::<Vec<_>>());

        let first = build_queue(20, &[], false, true, &mut StdRng::seed_from_u64(1));
        let second = build_queue(20, &[], false, true, &mut StdRng::seed_from_u64(1));
        assert_eq!(first, second);
    }

    #[test]
    fn navigation_wraps_around() {
        let queue = vec![2, 0, 1];
        assert_eq!(next_in_queue(&queue, Some(2)), Some(0));
        assert_eq!(next_in_queue(&queue, Some(1)), Some(2));
        assert_eq!(previous_in_queue(&queue, Some(2)), Some(1));
        assert_eq!(previous_in_queue(&queue, Some(0)), Some(2));
        assert_eq!(next_in_queue(&queue, None), Some(2));
        assert_eq!(next_in_queue(&queue, Some(9)), Some(2));
        assert_eq!(next_in_queue(&[], Some(1)), None);
        assert_eq!(previous_in_queue(&[], None), None);
    }
}
