//! Swipe through a short-video feed against the real CDN.
//!
//! ```text
//! cargo run -p core-service --example feed_demo -- [cache-dir]
//! ```
//!
//! Each "swipe" moves the cursor one item forward, reads the head of the new
//! item the way a player would, and prints the cache-size label.

use anyhow::Context;
use core_playback::Playlist;
use core_runtime::logging::{init_logging, LoggingConfig};
use core_service::bootstrap_desktop;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const FEED: &str = "
    https://cdn.pixabay.com/video/2024/05/31/214669_large.mp4
    https://cdn.pixabay.com/video/2025/10/04/307864_large.mp4
    https://cdn.pixabay.com/video/2024/10/13/236256_large.mp4
    https://cdn.pixabay.com/video/2025/08/20/298643_tiny.mp4
    https://cdn.pixabay.com/video/2025/08/12/296958_large.mp4
    https://cdn.pixabay.com/video/2025/01/10/251873_large.mp4
    https://cdn.pixabay.com/video/2025/06/24/287510_large.mp4
    https://cdn.pixabay.com/video/2023/03/08/153821-806526710_large.mp4
";

const HEAD_BYTES: u64 = 256 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default()).context("installing logger")?;

    let cache_dir = std::env::args().nth(1).map(PathBuf::from);
    let core = bootstrap_desktop(cache_dir).context("bootstrapping core")?;
    let session = core
        .open_session(Playlist::from_text(FEED))
        .await
        .context("opening session")?;

    println!("{}", session.cache_size_label());

    for index in 0..session.playlist().len() {
        let update = session.on_item_transition(index).await?;
        println!(
            "item {index}: window {:?}, spawned {:?}, cancelled {:?}",
            update.window, update.spawned, update.cancelled
        );

        let started = Instant::now();
        match session.request_bytes(index, 0, HEAD_BYTES).await {
            Ok(head) => println!(
                "  head: {} bytes in {:?}",
                head.len(),
                started.elapsed()
            ),
            Err(err) => println!("  head failed: {err}"),
        }

        // Time spent "watching" lets the window warm up.
        tokio::time::sleep(Duration::from_secs(2)).await;
        println!("  {}", session.cache_size_label());
    }

    let stats = session.cache_stats().await;
    println!(
        "hit rate {:.0}%, {} evictions, {} entries",
        stats.hit_rate(),
        stats.evictions,
        stats.entry_count
    );

    session.clear_cache().await.context("clearing cache")?;
    println!("after clear: {}", session.cache_size_label());

    session.shutdown().await;
    Ok(())
}
