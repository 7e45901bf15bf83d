//! Live-connection accounting
//!
//! Every connection a store hands out carries a [`ConnectionGuard`]. The
//! guard decrements the shared counter when the connection is dropped, so
//! `Store::open_connections` reflects exactly the connections still alive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counter of live connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    open: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    /// New tracker with no open connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more connection; it is released when the guard drops.
    pub fn acquire(&self) -> ConnectionGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            open: Arc::clone(&self.open),
        }
    }

    /// Connections currently alive.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Releases one tracked connection on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_lifetime() {
        let tracker = ConnectionTracker::new();
        let a = tracker.acquire();
        let b = tracker.acquire();
        assert_eq!(tracker.open(), 2);
        drop(a);
        assert_eq!(tracker.open(), 1);
        drop(b);
        assert_eq!(tracker.open(), 0);
    }

    #[test]
    fn test_clones_share_count() {
        let tracker = ConnectionTracker::new();
        let clone = tracker.clone();
        let _guard = clone.acquire();
        assert_eq!(tracker.open(), 1);
    }

    #[test]
    fn test_guard_released_from_other_thread() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.acquire();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert_eq!(tracker.open(), 0);
    }
}
