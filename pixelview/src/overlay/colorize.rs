//! Turning tile rasters into displayable RGBA images.

use image::{Rgba, RgbaImage};

use crate::tile::{OutputKind, PixelClass, Raster, TileResult};

/// Converts a computed tile into an RGBA image for drawing.
///
/// Implementations must be pure: the renderer caches their output per tile
/// until the colorizer is replaced.
pub trait TileColorizer: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    fn colorize(&self, tile: &TileResult) -> RgbaImage;
}

/// Colours pixels by their class.
///
/// - classification: the class colour, transparent for ignored classes and
///   labels with no class
/// - probability: class colours weighted by probability, with alpha equal to
///   the highest class probability
/// - RGB: passed through
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassColorizer;

impl ClassColorizer {
    pub fn new() -> Self {
        Self
    }
}

impl TileColorizer for ClassColorizer {
    fn name(&self) -> &str {
        "classes"
    }

    fn colorize(&self, tile: &TileResult) -> RgbaImage {
        let raster = tile.raster();
        match tile.output() {
            OutputKind::Classification { classes } => colorize_labels(raster, classes),
            OutputKind::Probability { classes } => colorize_probabilities(raster, classes),
            OutputKind::Rgb => to_rgba(raster),
        }
    }
}

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

fn colorize_labels(raster: &Raster, classes: &[PixelClass]) -> RgbaImage {
    RgbaImage::from_fn(raster.width(), raster.height(), |x, y| {
        let label = raster.pixel(x, y)[0] as usize;
        match classes.get(label) {
            Some(class) if !class.ignored => {
                let [r, g, b] = class.color;
                Rgba([r, g, b, 255])
            }
            _ => TRANSPARENT,
        }
    })
}

fn colorize_probabilities(raster: &Raster, classes: &[PixelClass]) -> RgbaImage {
    let channels = (raster.channels() as usize).min(classes.len());
    RgbaImage::from_fn(raster.width(), raster.height(), |x, y| {
        let pixel = raster.pixel(x, y);
        let mut rgb = [0u32; 3];
        let mut weight = 0u32;
        let mut max = 0u8;
        for (class, &p) in classes.iter().zip(pixel).take(channels) {
            max = max.max(p);
            if class.ignored {
                continue;
            }
            for (sum, c) in rgb.iter_mut().zip(class.color) {
                *sum += c as u32 * p as u32;
            }
            weight += p as u32;
        }
        if weight == 0 {
            return TRANSPARENT;
        }
        let [r, g, b] = rgb.map(|sum| (sum / weight) as u8);
        Rgba([r, g, b, max])
    })
}

/// Convert a display-ready raster to RGBA.
///
/// One channel is treated as grey, two as grey plus alpha, three as RGB and
/// four or more as RGBA.
pub fn to_rgba(raster: &Raster) -> RgbaImage {
    RgbaImage::from_fn(raster.width(), raster.height(), |x, y| {
        let p = raster.pixel(x, y);
        match p.len() {
            1 => Rgba([p[0], p[0], p[0], 255]),
            2 => Rgba([p[0], p[0], p[0], p[1]]),
            3 => Rgba([p[0], p[1], p[2], 255]),
            _ => Rgba([p[0], p[1], p[2], p[3]]),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> Vec<PixelClass> {
        vec![
            PixelClass::ignored("Ignore*"),
            PixelClass::new("Stroma", [0, 200, 0]),
            PixelClass::new("Tumor", [200, 0, 0]),
        ]
    }

    #[test]
    fn test_classification_colours() {
        let raster = Raster::from_vec(4, 1, 1, vec![0, 1, 2, 9]).unwrap();
        let tile = TileResult::new(raster, OutputKind::Classification { classes: classes() });

        let image = ClassColorizer.colorize(&tile);
        assert_eq!(image.dimensions(), (4, 1));
        assert_eq!(image.get_pixel(0, 0)[3], 0, "ignored class is transparent");
        assert_eq!(*image.get_pixel(1, 0), Rgba([0, 200, 0, 255]));
        assert_eq!(*image.get_pixel(2, 0), Rgba([200, 0, 0, 255]));
        assert_eq!(image.get_pixel(3, 0)[3], 0, "unknown label is transparent");
    }

    #[test]
    fn test_probability_blend() {
        // Pixel 0: all tumour. Pixel 1: half stroma, half tumour.
        let raster = Raster::from_vec(2, 1, 3, vec![0, 0, 255, 0, 128, 128]).unwrap();
        let tile = TileResult::new(raster, OutputKind::Probability { classes: classes() });

        let image = ClassColorizer.colorize(&tile);
        assert_eq!(*image.get_pixel(0, 0), Rgba([200, 0, 0, 255]));
        assert_eq!(*image.get_pixel(1, 0), Rgba([100, 100, 0, 128]));
    }

    #[test]
    fn test_probability_only_ignored_is_transparent() {
        let raster = Raster::from_vec(1, 1, 3, vec![255, 0, 0]).unwrap();
        let tile = TileResult::new(raster, OutputKind::Probability { classes: classes() });
        assert_eq!(*ClassColorizer.colorize(&tile).get_pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn test_rgb_passthrough() {
        let raster = Raster::from_vec(1, 1, 3, vec![10, 20, 30]).unwrap();
        let tile = TileResult::new(raster, OutputKind::Rgb);
        assert_eq!(
            *ClassColorizer.colorize(&tile).get_pixel(0, 0),
            Rgba([10, 20, 30, 255])
        );
    }

    #[test]
    fn test_to_rgba_channel_counts() {
        let grey = Raster::from_vec(1, 1, 1, vec![7]).unwrap();
        assert_eq!(*to_rgba(&grey).get_pixel(0, 0), Rgba([7, 7, 7, 255]));

        let rgba = Raster::from_vec(1, 1, 4, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(*to_rgba(&rgba).get_pixel(0, 0), Rgba([1, 2, 3, 4]));
    }
}
