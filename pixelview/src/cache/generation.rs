//! Tile-source generation guard.
//!
//! Each time the tile source, its classifier, or the overlay lifecycle
//! changes, the generation advances and every cached or pending result from
//! the previous generation becomes stale.
//!
//! Workers finish asynchronously, so "is my generation still current?" and
//! "write my result" must not be separated by an invalidation. Writers run
//! under the read lock via [`Generation::run_if_current`]; invalidation runs
//! under the write lock via [`Generation::advance`]. Many workers can write
//! concurrently, and none can interleave with a clear.
//!
//! Closing a single image works the same way at a finer grain: every image
//! has a close epoch, bumped by [`Generation::close_image`] while holding
//! that image's entry, and [`Generation::run_if_image_current`] only writes
//! if neither the generation nor the image's epoch has moved.

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::region::ImageId;

/// Monotonic generation counter with an invalidation lock.
#[derive(Debug, Default)]
pub struct Generation {
    current: RwLock<u64>,
    closed: DashMap<ImageId, u64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        *self.current.read()
    }

    /// Run `f` only if the generation is still `expected`.
    ///
    /// `f` runs under the read lock and must not call [`Generation::advance`].
    pub fn run_if_current<R>(&self, expected: u64, f: impl FnOnce() -> R) -> Option<R> {
        let current = self.current.read();
        if *current == expected {
            Some(f())
        } else {
            None
        }
    }

    /// Advance the generation, running `invalidate` while no writer can
    /// observe either generation. Returns the new generation.
    pub fn advance(&self, invalidate: impl FnOnce()) -> u64 {
        let mut current = self.current.write();
        *current += 1;
        invalidate();
        *current
    }

    /// Number of times `image` has been closed.
    pub fn image_epoch(&self, image: &ImageId) -> u64 {
        self.closed.get(image).map(|epoch| *epoch).unwrap_or(0)
    }

    /// Run `f` only if the generation is still `expected` and `image` has not
    /// been closed since its epoch was `image_epoch`.
    ///
    /// `f` must not call back into this guard.
    pub fn run_if_image_current<R>(
        &self,
        expected: u64,
        image: &ImageId,
        image_epoch: u64,
        f: impl FnOnce() -> R,
    ) -> Option<R> {
        let current = self.current.read();
        if *current != expected {
            return None;
        }
        let closed = self.closed.get(image);
        let epoch = closed.as_ref().map(|e| *e.value()).unwrap_or(0);
        if epoch != image_epoch {
            return None;
        }
        Some(f())
    }

    /// Mark `image` closed, running `invalidate` while no writer for the
    /// image can publish. Returns the image's new epoch and what
    /// `invalidate` returned.
    ///
    /// `invalidate` must not call back into this guard.
    pub fn close_image<R>(&self, image: &ImageId, invalidate: impl FnOnce() -> R) -> (u64, R) {
        let mut epoch = self.closed.entry(image.clone()).or_insert(0);
        *epoch += 1;
        (*epoch, invalidate())
    }
}
