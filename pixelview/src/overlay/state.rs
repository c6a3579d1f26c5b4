//! Overlay lifecycle state and change notifications.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::region::RegionKey;

/// Lifecycle state of an [`OverlayRenderer`](super::OverlayRenderer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    /// No tile source configured.
    Idle,
    /// Tile source attached; cached tiles are drawn, misses are skipped.
    Active,
    /// Tile source attached and cache misses start computations.
    LiveComputing,
    /// Terminal. Nothing is drawn or computed.
    Stopped,
}

impl fmt::Display for OverlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlayState::Idle => "idle",
            OverlayState::Active => "active",
            OverlayState::LiveComputing => "live",
            OverlayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Something observable about the overlay changed.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    /// A tile was computed and cached; a repaint will show it.
    TileReady(RegionKey),
    LivePredictionChanged(bool),
    OpacityChanged(f32),
    /// The tile source was replaced; carries the new source's name.
    SourceChanged(Option<String>),
    ColorizerChanged,
    Stopped,
}

/// Callback receiving [`OverlayEvent`]s.
pub type OverlayListener = Arc<dyn Fn(&OverlayEvent) + Send + Sync>;

/// Handle returned by `add_listener`, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<(ListenerId, OverlayListener)>>,
    next_id: AtomicU64,
}

impl Listeners {
    pub(crate) fn add(&self, listener: OverlayListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Call every listener. The list is copied first, so listeners may add
    /// or remove listeners.
    pub(crate) fn notify(&self, event: &OverlayEvent) {
        let listeners: Vec<OverlayListener> = self
            .entries
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}
