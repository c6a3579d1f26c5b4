//! Paint targets.

use std::path::Path;

use image::{ImageResult, Rgba, RgbaImage};

use crate::region::ImageRegion;

/// Something the overlay can draw tiles onto.
///
/// Regions are in full-resolution image coordinates; the canvas maps them
/// to its own pixels.
pub trait OverlayCanvas {
    /// Area the caller wants drawn, if narrower than the viewport.
    fn clip(&self) -> Option<ImageRegion> {
        None
    }

    /// Draw `tile` stretched over `region` with `opacity` (0..1).
    fn draw_tile(&mut self, tile: &RgbaImage, region: &ImageRegion, opacity: f32);
}

/// In-memory RGBA canvas covering a viewport at a fixed downsample.
///
/// Tiles are sampled nearest-neighbour and alpha-blended over what is
/// already there.
#[derive(Debug, Clone)]
pub struct RasterCanvas {
    viewport: ImageRegion,
    downsample: f64,
    clip: Option<ImageRegion>,
    image: RgbaImage,
}

impl RasterCanvas {
    /// Transparent canvas for `viewport` at `downsample` (values below
    /// 1e-6 are raised to it).
    pub fn new(viewport: ImageRegion, downsample: f64) -> Self {
        let downsample = if downsample.is_finite() {
            downsample.max(1e-6)
        } else {
            1.0
        };
        let width = ((viewport.width as f64 / downsample).ceil() as u32).max(1);
        let height = ((viewport.height as f64 / downsample).ceil() as u32).max(1);
        Self {
            viewport,
            downsample,
            clip: None,
            image: RgbaImage::new(width, height),
        }
    }

    /// Restrict drawing to `clip`.
    pub fn with_clip(mut self, clip: ImageRegion) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn viewport(&self) -> &ImageRegion {
        &self.viewport
    }

    pub fn downsample(&self) -> f64 {
        self.downsample
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Fill every pixel with `colour`.
    pub fn fill(&mut self, colour: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = colour;
        }
    }

    /// Number of pixels that are not fully transparent.
    pub fn painted_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p[3] > 0).count()
    }

    pub fn save_png(&self, path: &Path) -> ImageResult<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
    }

    /// Canvas pixel range covering full-resolution `[from, to)` along one
    /// axis starting at `origin`, clamped to `[0, limit)`.
    fn pixel_span(&self, origin: i32, from: i32, to: i32, limit: u32) -> (u32, u32) {
        let start = ((from - origin) as f64 / self.downsample).floor().max(0.0);
        let end = ((to - origin) as f64 / self.downsample).ceil().max(0.0);
        let start = (start as u32).min(limit);
        let end = (end as u32).min(limit);
        (start, end)
    }
}

impl OverlayCanvas for RasterCanvas {
    fn clip(&self) -> Option<ImageRegion> {
        self.clip
    }

    fn draw_tile(&mut self, tile: &RgbaImage, region: &ImageRegion, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity == 0.0 || region.is_empty() || tile.width() == 0 || tile.height() == 0 {
            return;
        }
        let mut target = match region.intersection(&self.viewport) {
            Some(target) => target,
            None => return,
        };
        if let Some(clip) = &self.clip {
            target = match target.intersection(clip) {
                Some(target) => target,
                None => return,
            };
        }

        let (x0, x1) = self.pixel_span(self.viewport.x, target.x, target.max_x(), self.image.width());
        let (y0, y1) = self.pixel_span(self.viewport.y, target.y, target.max_y(), self.image.height());

        for cy in y0..y1 {
            // Full-resolution coordinate of the canvas pixel centre
            let fy = self.viewport.y as f64 + (cy as f64 + 0.5) * self.downsample;
            if fy < target.y as f64 || fy >= target.max_y() as f64 {
                continue;
            }
            let ty = (((fy - region.y as f64) / region.height as f64) * tile.height() as f64)
                as u32;
            let ty = ty.min(tile.height() - 1);

            for cx in x0..x1 {
                let fx = self.viewport.x as f64 + (cx as f64 + 0.5) * self.downsample;
                if fx < target.x as f64 || fx >= target.max_x() as f64 {
                    continue;
                }
                let tx = (((fx - region.x as f64) / region.width as f64) * tile.width() as f64)
                    as u32;
                let tx = tx.min(tile.width() - 1);

                let src = tile.get_pixel(tx, ty);
                let dst = self.image.get_pixel_mut(cx, cy);
                blend(dst, src, opacity);
            }
        }
    }
}

/// Source-over blend of `src`, scaled by `opacity`, onto `dst`.
fn blend(dst: &mut Rgba<u8>, src: &Rgba<u8>, opacity: f32) {
    let sa = src[3] as f32 / 255.0 * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        let value = (s * sa + d * da * (1.0 - sa)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, colour: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(colour))
    }

    #[test]
    fn test_canvas_size() {
        let canvas = RasterCanvas::new(ImageRegion::new(0, 0, 1000, 500), 4.0);
        assert_eq!(canvas.image().dimensions(), (250, 125));

        let canvas = RasterCanvas::new(ImageRegion::new(0, 0, 10, 10), 3.0);
        assert_eq!(canvas.image().dimensions(), (4, 4));
    }

    #[test]
    fn test_draw_full_tile() {
        let mut canvas = RasterCanvas::new(ImageRegion::new(0, 0, 8, 8), 1.0);
        canvas.draw_tile(&solid(4, 4, [255, 0, 0, 255]), &ImageRegion::new(0, 0, 4, 4), 1.0);

        assert_eq!(*canvas.image().get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*canvas.image().get_pixel(3, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(canvas.image().get_pixel(4, 4)[3], 0);
        assert_eq!(canvas.painted_pixels(), 16);
    }

    #[test]
    fn test_draw_scaled_tile() {
        // A 2x2 tile stretched over 8x8 full-resolution pixels at downsample 2
        let mut tile = solid(2, 2, [0, 0, 255, 255]);
        tile.put_pixel(1, 1, Rgba([0, 255, 0, 255]));

        let mut canvas = RasterCanvas::new(ImageRegion::new(0, 0, 8, 8), 2.0);
        canvas.draw_tile(&tile, &ImageRegion::new(0, 0, 8, 8), 1.0);

        assert_eq!(*canvas.image().get_pixel(0, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(*canvas.image().get_pixel(3, 3), Rgba([0, 255, 0, 255]));
        assert_eq!(canvas.painted_pixels(), 16);
    }

    #[test]
    fn test_draw_respects_viewport_offset() {
        let mut canvas = RasterCanvas::new(ImageRegion::new(100, 100, 4, 4), 1.0);
        canvas.draw_tile(&solid(4, 4, [9, 9, 9, 255]), &ImageRegion::new(102, 102, 4, 4), 1.0);

        assert_eq!(canvas.image().get_pixel(1, 1)[3], 0);
        assert_eq!(canvas.image().get_pixel(2, 2)[3], 255);
        assert_eq!(canvas.painted_pixels(), 4);
    }

    #[test]
    fn test_clip_limits_drawing() {
        let mut canvas = RasterCanvas::new(ImageRegion::new(0, 0, 8, 8), 1.0)
            .with_clip(ImageRegion::new(0, 0, 2, 8));
        canvas.draw_tile(&solid(8, 8, [1, 2, 3, 255]), &ImageRegion::new(0, 0, 8, 8), 1.0);
        assert_eq!(canvas.painted_pixels(), 16);
    }

    #[test]
    fn test_opacity_blend() {
        let mut canvas = RasterCanvas::new(ImageRegion::new(0, 0, 1, 1), 1.0);
        canvas.fill(Rgba([0, 0, 0, 255]));
        canvas.draw_tile(&solid(1, 1, [200, 100, 0, 255]), &ImageRegion::new(0, 0, 1, 1), 0.5);
        assert_eq!(*canvas.image().get_pixel(0, 0), Rgba([100, 50, 0, 255]));
    }

    #[test]
    fn test_zero_opacity_draws_nothing() {
        let mut canvas = RasterCanvas::new(ImageRegion::new(0, 0, 4, 4), 1.0);
        canvas.draw_tile(&solid(4, 4, [255, 255, 255, 255]), &ImageRegion::new(0, 0, 4, 4), 0.0);
        assert_eq!(canvas.painted_pixels(), 0);
    }

    #[test]
    fn test_save_png() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("overlay.png");
        let mut canvas = RasterCanvas::new(ImageRegion::new(0, 0, 4, 4), 1.0);
        canvas.draw_tile(&solid(4, 4, [255, 0, 0, 255]), &ImageRegion::new(0, 0, 4, 4), 1.0);
        canvas.save_png(&path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (4, 4));
        assert_eq!(*loaded.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }
}
