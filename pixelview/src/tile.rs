//! Computed tile artifacts.
//!
//! A [`TileResult`] is what a classification server produces for one
//! [`RegionKey`](crate::region::RegionKey): an 8-bit interleaved raster plus
//! the channel semantics a colorizer needs to turn it into something
//! displayable.

use std::fmt;

/// Interleaved 8-bit raster.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Raster {
    /// Create a raster from interleaved samples.
    ///
    /// Returns `None` if `data` does not hold exactly
    /// `width * height * channels` samples or `channels` is zero.
    pub fn from_vec(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(channels as usize)?;
        if channels == 0 || data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Create a zero-filled raster.
    pub fn zeros(width: u32, height: u32, channels: u8) -> Self {
        let channels = channels.max(1);
        Self {
            width,
            height,
            channels,
            data: vec![0; width as usize * height as usize * channels as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Samples of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * c;
        &self.data[offset..offset + c]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let c = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * c;
        &mut self.data[offset..offset + c]
    }

    /// Size of the sample buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish()
    }
}

/// One output class of a pixel classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelClass {
    pub name: String,
    pub color: [u8; 3],
    /// Ignored classes are rendered fully transparent.
    pub ignored: bool,
}

impl PixelClass {
    pub fn new(name: impl Into<String>, color: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            color,
            ignored: false,
        }
    }

    pub fn ignored(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: [0, 0, 0],
            ignored: true,
        }
    }
}

/// Channel semantics of a tile raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// Single channel holding a class index per pixel.
    Classification { classes: Vec<PixelClass> },
    /// One channel per class holding a 0..255 probability.
    Probability { classes: Vec<PixelClass> },
    /// Already display-ready RGB or RGBA samples.
    Rgb,
}

impl OutputKind {
    /// Number of raster channels this output kind expects, if fixed.
    pub fn expected_channels(&self) -> Option<u8> {
        match self {
            Self::Classification { .. } => Some(1),
            Self::Probability { classes } => u8::try_from(classes.len()).ok(),
            Self::Rgb => None,
        }
    }

    pub fn is_display_ready(&self) -> bool {
        matches!(self, Self::Rgb)
    }

    pub fn classes(&self) -> &[PixelClass] {
        match self {
            Self::Classification { classes } | Self::Probability { classes } => classes,
            Self::Rgb => &[],
        }
    }
}

/// Computed result for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct TileResult {
    raster: Raster,
    output: OutputKind,
}

impl TileResult {
    pub fn new(raster: Raster, output: OutputKind) -> Self {
        Self { raster, output }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn output(&self) -> &OutputKind {
        &self.output
    }

    /// Approximate memory footprint, used to weigh cache entries.
    pub fn byte_len(&self) -> usize {
        self.raster.byte_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_from_vec_checks_length() {
        assert!(Raster::from_vec(2, 2, 1, vec![0; 4]).is_some());
        assert!(Raster::from_vec(2, 2, 1, vec![0; 3]).is_none());
        assert!(Raster::from_vec(2, 2, 0, vec![]).is_none());
    }

    #[test]
    fn test_raster_pixel_access() {
        let mut raster = Raster::zeros(3, 2, 2);
        raster.pixel_mut(2, 1).copy_from_slice(&[7, 9]);
        assert_eq!(raster.pixel(2, 1), &[7, 9]);
        assert_eq!(raster.pixel(0, 0), &[0, 0]);
        assert_eq!(raster.byte_len(), 12);
    }

    #[test]
    fn test_output_kind_expected_channels() {
        let classes = vec![PixelClass::new("a", [1, 2, 3]), PixelClass::new("b", [4, 5, 6])];
        assert_eq!(
            OutputKind::Classification {
                classes: classes.clone()
            }
            .expected_channels(),
            Some(1)
        );
        assert_eq!(
            OutputKind::Probability { classes }.expected_channels(),
            Some(2)
        );
        assert_eq!(OutputKind::Rgb.expected_channels(), None);
        assert!(OutputKind::Rgb.is_display_ready());
    }

    #[test]
    fn test_ignored_class() {
        let class = PixelClass::ignored("Ignore*");
        assert!(class.ignored);
        assert_eq!(class.name, "Ignore*");
    }
}
