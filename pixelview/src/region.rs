//! Region identity types.
//!
//! A [`RegionKey`] names one rectangular area of a source image at a given
//! pyramid downsample and plane. It is the key of both the tile cache and the
//! pending-request tracker, so equality and hashing cover every field.
//!
//! Coordinates are always expressed in full-resolution pixels, regardless of
//! the downsample the region is rendered at.
//!
//! # Example
//!
//! ```
//! use pixelview::region::{ImageId, Plane, RegionKey};
//!
//! let key = RegionKey::new(ImageId::new("slide-1"), 0, 512, 1024, 1024, 4.0, Plane::default());
//! assert_eq!(key.x(), 0);
//! assert_eq!(key.downsample(), 4.0);
//! assert_eq!(key.level_width(), 256);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Stable identifier of an open image session.
///
/// Cheap to clone; shared by every key that refers to the image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(Arc<str>);

impl ImageId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Z-slice and time point of a multi-dimensional image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Plane {
    pub z: u32,
    pub t: u32,
}

impl Plane {
    pub fn new(z: u32, t: u32) -> Self {
        Self { z, t }
    }
}

/// Axis-aligned rectangle in full-resolution image coordinates.
///
/// Width and height are never negative; an empty region has zero area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ImageRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// Exclusive right edge.
    pub fn max_x(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn max_y(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn intersects(&self, other: &ImageRegion) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.max_x()
            && other.x < self.max_x()
            && self.y < other.max_y()
            && other.y < self.max_y()
    }

    /// Overlapping area of two regions, `None` when they do not overlap.
    pub fn intersection(&self, other: &ImageRegion) -> Option<ImageRegion> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        Some(ImageRegion::new(x, y, max_x - x, max_y - y))
    }

    /// True if `other` lies completely inside this region.
    pub fn contains(&self, other: &ImageRegion) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Center point, used for centre-first tile ordering.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// Identity of one tile request.
///
/// Immutable; the downsample is compared bit-wise so that `Eq` and `Hash`
/// agree.
#[derive(Debug, Clone)]
pub struct RegionKey {
    image: ImageId,
    region: ImageRegion,
    downsample: f64,
    plane: Plane,
}

impl RegionKey {
    pub fn new(
        image: ImageId,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        downsample: f64,
        plane: Plane,
    ) -> Self {
        Self::from_region(image, ImageRegion::new(x, y, width, height), downsample, plane)
    }

    pub fn from_region(image: ImageId, region: ImageRegion, downsample: f64, plane: Plane) -> Self {
        Self {
            image,
            region,
            downsample,
            plane,
        }
    }

    pub fn image(&self) -> &ImageId {
        &self.image
    }

    pub fn region(&self) -> &ImageRegion {
        &self.region
    }

    pub fn x(&self) -> i32 {
        self.region.x
    }

    pub fn y(&self) -> i32 {
        self.region.y
    }

    pub fn width(&self) -> i32 {
        self.region.width
    }

    pub fn height(&self) -> i32 {
        self.region.height
    }

    pub fn downsample(&self) -> f64 {
        self.downsample
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// Width of the region in pixels of its own pyramid level.
    pub fn level_width(&self) -> u32 {
        scaled_extent(self.region.width, self.downsample)
    }

    /// Height of the region in pixels of its own pyramid level.
    pub fn level_height(&self) -> u32 {
        scaled_extent(self.region.height, self.downsample)
    }
}

fn scaled_extent(extent: i32, downsample: f64) -> u32 {
    if extent <= 0 || downsample <= 0.0 {
        return 0;
    }
    ((extent as f64 / downsample).round() as u32).max(1)
}

impl PartialEq for RegionKey {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
            && self.region == other.region
            && self.downsample.to_bits() == other.downsample.to_bits()
            && self.plane == other.plane
    }
}

impl Eq for RegionKey {}

impl Hash for RegionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.image.hash(state);
        self.region.hash(state);
        self.downsample.to_bits().hash(state);
        self.plane.hash(state);
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[x={}, y={}, w={}, h={}, ds={}, z={}, t={}]",
            self.image,
            self.region.x,
            self.region.y,
            self.region.width,
            self.region.height,
            self.downsample,
            self.plane.z,
            self.plane.t
        )
    }
}

/// The paint caller's view of the currently open image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageContext {
    pub id: ImageId,
    pub width: u32,
    pub height: u32,
    /// Pyramid downsamples of the source image, ascending.
    pub downsamples: Vec<f64>,
    pub plane: Plane,
}

impl ImageContext {
    pub fn new(id: impl Into<ImageId>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            downsamples: vec![1.0],
            plane: Plane::default(),
        }
    }

    pub fn with_downsamples(mut self, downsamples: Vec<f64>) -> Self {
        self.downsamples = downsamples;
        self
    }

    pub fn with_plane(mut self, plane: Plane) -> Self {
        self.plane = plane;
        self
    }

    /// Full image bounds.
    pub fn bounds(&self) -> ImageRegion {
        ImageRegion::new(
            0,
            0,
            self.width.min(i32::MAX as u32) as i32,
            self.height.min(i32::MAX as u32) as i32,
        )
    }
}
