// Link-state watcher driven by stdin.
// Invariants: the watcher only flips the shared flag; drains are decided by
// the main loop on the next sample it processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

pub async fn watch_stdin_toggle(link_online: Arc<AtomicBool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(_)) = lines.next_line().await {
        let was_online = link_online.fetch_xor(true, Ordering::Relaxed);
        info!(online = !was_online, "link state toggled");
    }
}
