//! Production playback collaborators
//!
//! `ExternalPlayer` hands HTTP sources to a desktop media player;
//! `WebTorrentClient` drives the webtorrent CLI for magnet sources.

use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

mod external;
mod webtorrent;

pub use external::{ExternalPlayer, PlayerSettings};
pub use webtorrent::{WebTorrentClient, WebTorrentSettings};

/// A child process shared between its owner and the thread watching it.
/// Whoever takes the child out is responsible for reaping it.
pub(crate) type ProcessSlot = Arc<Mutex<Option<Child>>>;

pub(crate) fn lock_slot(slot: &ProcessSlot) -> MutexGuard<'_, Option<Child>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kill and reap whatever is still in `slot`.
pub(crate) fn kill_slot(slot: &ProcessSlot) {
    if let Some(mut child) = lock_slot(slot).take() {
        let _ = child.kill();
        let _ = child.wait();
    }
}
