//! Pyramid level selection and tile enumeration.
//!
//! Given a viewport in full-resolution coordinates and the downsample it is
//! painted at, pick the pyramid level to request and enumerate the tiles of
//! that level intersecting the viewport.
//!
//! # Level selection
//!
//! The preferred level is the coarsest one whose downsample does not exceed
//! the requested downsample, so the overlay is never upsampled from a coarser
//! level than needed and never computed at more detail than displayed. When
//! the request is finer than every level, level 0 is used.
//!
//! ```text
//! levels:      1.0     4.0     16.0
//! request 3.0  ──► 1.0
//! request 4.0  ──────────► 4.0
//! request 50   ──────────────────► 16.0
//! request 0.5  ──► 1.0
//! ```

use std::cmp::Ordering;

use crate::region::{ImageId, ImageRegion, Plane, RegionKey};

use super::ServerMetadata;

/// Relative tolerance when comparing a requested downsample to a level.
const DOWNSAMPLE_TOLERANCE: f64 = 1e-3;

/// Index of the preferred level for a requested downsample.
///
/// `downsamples` must be ascending and non-empty; an empty slice yields 0.
pub fn preferred_level(downsamples: &[f64], requested: f64) -> usize {
    let limit = requested * (1.0 + DOWNSAMPLE_TOLERANCE);
    downsamples
        .iter()
        .rposition(|&d| d <= limit)
        .unwrap_or(0)
}

/// Enumerate the tiles of one level intersecting `region`.
///
/// Tiles are clipped to the server bounds and returned centre-first: the
/// tile closest to the centre of `region` comes first, so the most visible
/// work is submitted before the periphery.
pub fn tiles_at_level(
    meta: &ServerMetadata,
    image: &ImageId,
    region: &ImageRegion,
    level: usize,
    plane: Plane,
) -> Vec<RegionKey> {
    let Some(&downsample) = meta.downsamples().get(level) else {
        return Vec::new();
    };
    let bounds = ImageRegion::new(
        0,
        0,
        meta.width.min(i32::MAX as u32) as i32,
        meta.height.min(i32::MAX as u32) as i32,
    );
    let Some(area) = region.intersection(&bounds) else {
        return Vec::new();
    };

    let tile_w = meta.tile_width as f64 * downsample;
    let tile_h = meta.tile_height as f64 * downsample;

    let tx0 = (area.x as f64 / tile_w).floor() as i64;
    let tx1 = ((area.max_x() - 1) as f64 / tile_w).floor() as i64;
    let ty0 = (area.y as f64 / tile_h).floor() as i64;
    let ty1 = ((area.max_y() - 1) as f64 / tile_h).floor() as i64;

    let mut tiles = Vec::with_capacity(((tx1 - tx0 + 1) * (ty1 - ty0 + 1)).max(0) as usize);
    for ty in ty0..=ty1 {
        let y0 = (ty as f64 * tile_h).round() as i32;
        let y1 = (((ty + 1) as f64 * tile_h).round() as i32).min(bounds.max_y());
        for tx in tx0..=tx1 {
            let x0 = (tx as f64 * tile_w).round() as i32;
            let x1 = (((tx + 1) as f64 * tile_w).round() as i32).min(bounds.max_x());
            if x1 > x0 && y1 > y0 {
                tiles.push(RegionKey::new(
                    image.clone(),
                    x0,
                    y0,
                    x1 - x0,
                    y1 - y0,
                    downsample,
                    plane,
                ));
            }
        }
    }

    let (cx, cy) = region.center();
    tiles.sort_by(|a, b| {
        let da = distance_sq(a.region(), cx, cy);
        let db = distance_sq(b.region(), cx, cy);
        da.partial_cmp(&db)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (a.y(), a.x()).cmp(&(b.y(), b.x())))
    });
    tiles
}

/// Enumerate the tiles intersecting `region` at the preferred level for
/// `requested_downsample`.
pub fn tiles_for_region(
    meta: &ServerMetadata,
    image: &ImageId,
    region: &ImageRegion,
    requested_downsample: f64,
    plane: Plane,
) -> Vec<RegionKey> {
    let level = preferred_level(meta.downsamples(), requested_downsample);
    tiles_at_level(meta, image, region, level, plane)
}

fn distance_sq(region: &ImageRegion, cx: f64, cy: f64) -> f64 {
    let (x, y) = region.center();
    (x - cx).powi(2) + (y - cy).powi(2)
}
