use std::env;
use std::path::PathBuf;

use library::config::resolve_optional;
use library::{config_path_from_env, LibraryBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (library, config) = LibraryBuilder::from_config_path(&config_path)?;

    let music_root = env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| resolve_optional(&config_path, Some(config.music_root.as_str())))
        .ok_or("music_root not set and no path argument")?;

    let summary = library.open_folder(music_root).await?.wait().await?;
    info!(
        "Enriched: {} tags, {} lyrics, {} info sidecars, {} folder covers",
        summary.tags.updated, summary.lyrics.updated, summary.info.updated, summary.covers
    );

    let views = library.track_views();
    let albums = library.albums_for(&views);
    println!("{} tracks in {} albums", views.len(), albums.len());
    for album in &albums {
        println!("[{}] {} ({} tracks)", album.kind.as_str(), album.title, album.len());
        for (view, _) in &album.tracks {
            let number = view.track_no_raw.as_deref().unwrap_or("-");
            match view.display_artist.as_deref() {
                Some(artist) => println!("  {:>5}  {} / {}", number, view.display_title, artist),
                None => println!("  {:>5}  {}", number, view.display_title),
            }
        }
    }

    let queue = library.queue(&mut rand::rng());
    println!("Queue: {} entries", queue.len());
    Ok(())
}
