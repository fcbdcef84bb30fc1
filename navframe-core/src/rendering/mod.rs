//! rendering — resizing, concatenation and full-frame overlays
//!
//! Every resize goes through `fast_image_resize`. `FrameRenderer` keeps one
//! resizer alive so callers assembling many frames avoid re-allocating its
//! scratch buffers; the free functions build a throwaway renderer.

use anyhow::{ensure, Context, Result};
use fast_image_resize as fr;
use image::{GenericImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage, RgbaImage};
use tracing::debug;

/// Default opacity of the collision strip.
pub const COLLISION_ALPHA: f32 = 0.4;
/// Collision strip width is the view height divided by this.
const COLLISION_STRIP_DIVISOR: u32 = 20;

/// Interpolation used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    Nearest,
    #[default]
    Bilinear,
    /// Bicubic (Catmull-Rom), used for the top-down map.
    CatmullRom,
}

impl Resampling {
    fn alg(self) -> fr::ResizeAlg {
        match self {
            Resampling::Nearest => fr::ResizeAlg::Nearest,
            Resampling::Bilinear => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            Resampling::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        }
    }
}

/// Reusable resize context.
pub struct FrameRenderer {
    resizer: fr::Resizer,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    fn resize_raw(
        &mut self,
        (src_w, src_h): (u32, u32),
        data: &[u8],
        (dst_w, dst_h): (u32, u32),
        pixel: fr::PixelType,
        resampling: Resampling,
    ) -> Result<Vec<u8>> {
        ensure!(
            src_w > 0 && src_h > 0 && dst_w > 0 && dst_h > 0,
            "cannot resize {src_w}x{src_h} to {dst_w}x{dst_h}"
        );
        let src = fr::images::ImageRef::new(src_w, src_h, data, pixel)
            .context("failed to create fast_image_resize source")?;
        let mut dst = fr::images::Image::new(dst_w, dst_h, pixel);

        let options = fr::ResizeOptions::new().resize_alg(resampling.alg());
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("fast_image_resize resize failed")?;
        Ok(dst.into_vec())
    }

    /// Resize an RGB image to exactly `width`×`height`.
    pub fn resize_rgb(
        &mut self,
        image: &RgbImage,
        width: u32,
        height: u32,
        resampling: Resampling,
    ) -> Result<RgbImage> {
        if image.dimensions() == (width, height) {
            return Ok(image.clone());
        }
        let data = self.resize_raw(
            image.dimensions(),
            image.as_raw(),
            (width, height),
            fr::PixelType::U8x3,
            resampling,
        )?;
        RgbImage::from_raw(width, height, data).context("resized RGB buffer has wrong length")
    }

    /// Resize an RGBA sprite to exactly `width`×`height`.
    pub fn resize_rgba(
        &mut self,
        image: &RgbaImage,
        width: u32,
        height: u32,
        resampling: Resampling,
    ) -> Result<RgbaImage> {
        if image.dimensions() == (width, height) {
            return Ok(image.clone());
        }
        let data = self.resize_raw(
            image.dimensions(),
            image.as_raw(),
            (width, height),
            fr::PixelType::U8x4,
            resampling,
        )?;
        RgbaImage::from_raw(width, height, data).context("resized RGBA buffer has wrong length")
    }

    /// Scale by independent factors; output size is rounded.
    pub fn scale_by(&mut self, image: &RgbImage, fx: f32, fy: f32, resampling: Resampling) -> Result<RgbImage> {
        let w = (image.width() as f32 * fx).round() as u32;
        let h = (image.height() as f32 * fy).round() as u32;
        self.resize_rgb(image, w, h, resampling)
    }

    /// Place `a` and `b` side by side, first resizing the shorter one to the
    /// taller one's height. Width follows `int(w / h * target_h)`.
    pub fn concat_horizontal(&mut self, a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
        let (a, b) = match a.height().cmp(&b.height()) {
            std::cmp::Ordering::Greater => {
                let b = self.match_height(b, a.height())?;
                (a.clone(), b)
            }
            std::cmp::Ordering::Less => {
                let a = self.match_height(a, b.height())?;
                (a, b.clone())
            }
            std::cmp::Ordering::Equal => (a.clone(), b.clone()),
        };
        hstack(&[a, b])
    }

    /// Stack `a` over `b`, first resizing the narrower one to the wider one's
    /// width.
    pub fn concat_vertical(&mut self, a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
        let (a, b) = match a.width().cmp(&b.width()) {
            std::cmp::Ordering::Greater => {
                let b = self.match_width(b, a.width())?;
                (a.clone(), b)
            }
            std::cmp::Ordering::Less => {
                let a = self.match_width(a, b.width())?;
                (a, b.clone())
            }
            std::cmp::Ordering::Equal => (a.clone(), b.clone()),
        };
        vstack(&[a, b])
    }

    fn match_height(&mut self, image: &RgbImage, height: u32) -> Result<RgbImage> {
        let (w, h) = image.dimensions();
        let width = ((w as f32 / h as f32 * height as f32) as u32).max(1);
        self.resize_rgb(image, width, height, Resampling::Bilinear)
    }

    fn match_width(&mut self, image: &RgbImage, width: u32) -> Result<RgbImage> {
        let (w, h) = image.dimensions();
        let height = ((h as f32 / w as f32 * width as f32) as u32).max(1);
        self.resize_rgb(image, width, height, Resampling::Bilinear)
    }

    /// Fit `image` inside `width`×`height` keeping its aspect, centred on a
    /// canvas filled with `background`.
    pub fn letterbox(&mut self, image: &RgbImage, width: u32, height: u32, background: Rgb<u8>) -> Result<RgbImage> {
        let (w, h) = image.dimensions();
        ensure!(w > 0 && h > 0, "cannot letterbox an empty image");
        let scale = (width as f32 / w as f32).min(height as f32 / h as f32);
        let sw = ((w as f32 * scale) as u32).clamp(1, width);
        let sh = ((h as f32 * scale) as u32).clamp(1, height);
        let scaled = self.resize_rgb(image, sw, sh, Resampling::Bilinear)?;

        let mut canvas = RgbImage::from_pixel(width, height, background);
        canvas
            .copy_from(&scaled, (width - sw) / 2, (height - sh) / 2)
            .context("letterboxed image does not fit its canvas")?;
        Ok(canvas)
    }

    /// Lay `images` out on a `rows`×`cols` grid of `cell_h`×`cell_w` cells.
    ///
    /// Gaps between cells are `hspace * cell_h` and `wspace * cell_w` pixels.
    /// Images fill cells row by row, or column by column when `transpose`
    /// is set; each is letterboxed into its cell. Unused cells stay blank.
    pub fn subplot2(
        &mut self,
        images: &[RgbImage],
        (rows, cols): (u32, u32),
        (cell_h, cell_w): (u32, u32),
        (hspace, wspace): (f32, f32),
        transpose: bool,
    ) -> Result<RgbImage> {
        ensure!(rows > 0 && cols > 0, "grid must have at least one cell");
        ensure!(
            images.len() <= (rows * cols) as usize,
            "{} images do not fit a {rows}x{cols} grid",
            images.len()
        );
        let gap_y = (hspace * cell_h as f32).round() as u32;
        let gap_x = (wspace * cell_w as f32).round() as u32;
        let width = cols * cell_w + (cols - 1) * gap_x;
        let height = rows * cell_h + (rows - 1) * gap_y;
        let background = Rgb([255, 255, 255]);

        let mut canvas = RgbImage::from_pixel(width, height, background);
        for (idx, image) in images.iter().enumerate() {
            let idx = idx as u32;
            let (row, col) = if transpose {
                (idx % rows, idx / rows)
            } else {
                (idx / cols, idx % cols)
            };
            let cell = self.letterbox(image, cell_w, cell_h, background)?;
            canvas
                .copy_from(&cell, col * (cell_w + gap_x), row * (cell_h + gap_y))
                .context("grid cell out of canvas bounds")?;
        }
        debug!(rows, cols, images = images.len(), "built subplot grid");
        Ok(canvas)
    }
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Resize `image` to `width`×`height`.
pub fn resize(image: &RgbImage, width: u32, height: u32, resampling: Resampling) -> Result<RgbImage> {
    FrameRenderer::new().resize_rgb(image, width, height, resampling)
}

pub fn concat_horizontal(a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
    FrameRenderer::new().concat_horizontal(a, b)
}

pub fn concat_vertical(a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
    FrameRenderer::new().concat_vertical(a, b)
}

/// Grid contact sheet, see [`FrameRenderer::subplot2`].
pub fn subplot2(
    images: &[RgbImage],
    grid: (u32, u32),
    cell: (u32, u32),
    space: (f32, f32),
    transpose: bool,
) -> Result<RgbImage> {
    FrameRenderer::new().subplot2(images, grid, cell, space, transpose)
}

/// Join images left to right. Heights must match.
pub fn hstack(images: &[RgbImage]) -> Result<RgbImage> {
    let Some(first) = images.first() else {
        return Ok(RgbImage::new(0, 0));
    };
    let height = first.height();
    for img in images {
        ensure!(
            img.height() == height,
            "cannot concatenate horizontally: heights {} and {height} differ",
            img.height()
        );
    }
    let width = images.iter().map(RgbImage::width).sum();
    let mut out = RgbImage::new(width, height);
    let mut x = 0;
    for img in images {
        out.copy_from(img, x, 0)
            .context("horizontal concatenation out of bounds")?;
        x += img.width();
    }
    Ok(out)
}

/// Join images top to bottom. Widths must match.
pub fn vstack(images: &[RgbImage]) -> Result<RgbImage> {
    let Some(first) = images.first() else {
        return Ok(RgbImage::new(0, 0));
    };
    let width = first.width();
    for img in images {
        ensure!(
            img.width() == width,
            "cannot concatenate vertically: widths {} and {width} differ",
            img.width()
        );
    }
    let height = images.iter().map(RgbImage::height).sum();
    let mut out = RgbImage::new(width, height);
    let mut y = 0;
    for img in images {
        out.copy_from(img, 0, y)
            .context("vertical concatenation out of bounds")?;
        y += img.height();
    }
    Ok(out)
}

/// Blend a translucent red strip over the border of `view` to flag a
/// collision. The strip is `height / 20` pixels wide on every side; views
/// shorter than 20 rows are tinted entirely. `alpha` of 1 is opaque.
pub fn draw_collision(view: &mut RgbImage, alpha: f32) {
    let (w, h) = view.dimensions();
    let strip = h / COLLISION_STRIP_DIVISOR;
    let red = [255.0f32, 0.0, 0.0];

    for (x, y, px) in view.enumerate_pixels_mut() {
        let on_border = strip == 0
            || x < strip
            || y < strip
            || x >= w.saturating_sub(strip)
            || y >= h.saturating_sub(strip);
        if !on_border {
            continue;
        }
        for (c, v) in px.0.iter_mut().enumerate() {
            *v = (alpha * red[c] + (1.0 - alpha) * *v as f32).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Depth map in `[0, 1]` as an 8-bit grey RGB image.
pub fn depth_to_image(depth: &ImageBuffer<Luma<f32>, Vec<f32>>) -> RgbImage {
    let grey = GrayImage::from_fn(depth.width(), depth.height(), |x, y| {
        let d = depth.get_pixel(x, y).0[0];
        Luma([(d * 255.0).clamp(0.0, 255.0) as u8])
    });
    image::DynamicImage::ImageLuma8(grey).to_rgb8()
}
