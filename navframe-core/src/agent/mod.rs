//! agent — agent sprites on top-down maps.
//!
//! Sprites are RGBA images pointing "up" at zero rotation. They are rotated
//! before resizing to keep resolution, then resized so the drawn agent keeps
//! its apparent radius even though the rotated canvas is larger.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::point::Point;
use nalgebra::{Rotation2, Vector2};
use tracing::debug;

use crate::map::GridPoint;
use crate::rendering::{FrameRenderer, Resampling};

/// Default agent radius on the map, in pixels.
pub const DEFAULT_AGENT_RADIUS: u32 = 5;

/// Sprite set indexed by agent id.
#[derive(Debug, Clone, Default)]
pub struct AgentSprites {
    sprites: Vec<RgbaImage>,
}

impl AgentSprites {
    pub fn new(sprites: Vec<RgbaImage>) -> Self {
        Self { sprites }
    }

    /// Load one sprite per path; agent ids follow the path order.
    pub fn load<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let sprites = paths
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                image::open(p)
                    .map(|img| img.to_rgba8())
                    .with_context(|| format!("failed to load agent sprite {}", p.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sprites })
    }

    /// Built-in sprite: a filled upward arrow head of side `size`.
    pub fn arrow(size: u32, color: Rgb<u8>) -> RgbaImage {
        let mut sprite = RgbaImage::new(size, size);
        let s = size as i32 - 1;
        let poly = [
            Point::new(s / 2, 0),
            Point::new(s, s),
            Point::new(s / 2, s * 2 / 3),
            Point::new(0, s),
        ];
        let [r, g, b] = color.0;
        imageproc::drawing::draw_polygon_mut(&mut sprite, &poly, Rgba([r, g, b, 255]));
        sprite
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn get(&self, agent_id: usize) -> Result<&RgbaImage> {
        self.sprites
            .get(agent_id)
            .ok_or_else(|| anyhow!("no sprite for agent {agent_id} ({} loaded)", self.len()))
    }

    /// [`draw_agent`] with the sprite of `agent_id`.
    pub fn draw(
        &self,
        image: &mut RgbImage,
        agent_id: usize,
        center: GridPoint,
        rotation: f32,
        radius: u32,
    ) -> Result<()> {
        draw_agent(image, self.get(agent_id)?, center, rotation, radius)
    }
}

/// Rotate `sprite` counter-clockwise by `angle` radians, growing the canvas to
/// the rotated bounding box. Uncovered pixels are transparent.
pub fn rotate_expand(sprite: &RgbaImage, angle: f32) -> RgbaImage {
    if angle == 0.0 {
        return sprite.clone();
    }
    let (w, h) = sprite.dimensions();
    let rot = Rotation2::new(angle);
    let (hw, hh) = (w as f32 / 2.0, h as f32 / 2.0);
    let corners = [
        Vector2::new(-hw, -hh),
        Vector2::new(hw, -hh),
        Vector2::new(hw, hh),
        Vector2::new(-hw, hh),
    ];
    let (mut max_x, mut max_y) = (0.0f32, 0.0f32);
    for c in corners {
        let r = rot * c;
        max_x = max_x.max(r.x.abs());
        max_y = max_y.max(r.y.abs());
    }
    let nw = ((2.0 * max_x).round() as u32).max(1);
    let nh = ((2.0 * max_y).round() as u32).max(1);

    let (cw, ch) = (w.max(nw), h.max(nh));
    let mut canvas = RgbaImage::new(cw, ch);
    imageops::overlay(&mut canvas, sprite, ((cw - w) / 2) as i64, ((ch - h) / 2) as i64);

    // imageproc turns clockwise for positive angles in image coordinates.
    let rotated = rotate_about_center(&canvas, -angle, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));
    imageops::crop_imm(&rotated, (cw - nw) / 2, (ch - nh) / 2, nw, nh).to_image()
}

/// Alpha-composite `foreground` centred on `center` (`(row, col)`), clipping
/// whatever falls outside `background`.
pub fn paste_overlapping_image(background: &mut RgbImage, foreground: &RgbaImage, center: GridPoint) {
    let (fw, fh) = foreground.dimensions();
    let (bw, bh) = background.dimensions();
    let top = center.row - (fh / 2) as i64;
    let left = center.col - (fw / 2) as i64;

    for (fx, fy, fg) in foreground.enumerate_pixels() {
        let bx = left + fx as i64;
        let by = top + fy as i64;
        if bx < 0 || by < 0 || bx >= bw as i64 || by >= bh as i64 {
            continue;
        }
        let a = fg.0[3] as u32;
        let bg = background.get_pixel_mut(bx as u32, by as u32);
        for c in 0..3 {
            bg.0[c] = ((bg.0[c] as u32 * (255 - a) + fg.0[c] as u32 * a) / 255) as u8;
        }
    }
}

/// Composite `sprite`, rotated by `rotation` radians and scaled to a
/// `radius`-pixel agent, onto `image` at `center`. Modifies `image` in place.
pub fn draw_agent(
    image: &mut RgbImage,
    sprite: &RgbaImage,
    center: GridPoint,
    rotation: f32,
    radius: u32,
) -> Result<()> {
    let rotated = rotate_expand(sprite, rotation);
    let initial = sprite.height().max(1);
    let size = ((radius as f32 * 2.0 * rotated.height() as f32 / initial as f32) as u32).max(1);
    let resized = FrameRenderer::new()
        .resize_rgba(&rotated, size, size, Resampling::Bilinear)
        .context("failed to resize agent sprite")?;
    debug!(
        row = center.row,
        col = center.col,
        degrees = rotation.to_degrees(),
        size,
        "drawing agent"
    );
    paste_overlapping_image(image, &resized, center);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_sprite(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255]))
    }

    #[test]
    fn rotation_grows_canvas() {
        let sprite = solid_sprite(20, 20);
        assert_eq!(rotate_expand(&sprite, 0.0).dimensions(), (20, 20));
        let (w, h) = rotate_expand(&sprite, std::f32::consts::FRAC_PI_4).dimensions();
        assert_eq!((w, h), (28, 28));
        let (w, h) = rotate_expand(&solid_sprite(10, 20), std::f32::consts::FRAC_PI_2).dimensions();
        assert_eq!((w, h), (20, 10));
    }

    #[test]
    fn opaque_paste_replaces_and_clips() {
        let mut bg = RgbImage::new(10, 10);
        paste_overlapping_image(&mut bg, &solid_sprite(4, 4), GridPoint::new(0, 0));
        assert_eq!(bg.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(bg.get_pixel(1, 1).0, [255, 0, 0]);
        assert_eq!(bg.get_pixel(2, 2).0, [0, 0, 0]);
    }

    #[test]
    fn transparent_paste_keeps_background() {
        let mut bg = RgbImage::from_pixel(6, 6, Rgb([10, 20, 30]));
        let fg = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 0]));
        paste_overlapping_image(&mut bg, &fg, GridPoint::new(3, 3));
        assert!(bg.pixels().all(|p| p.0 == [10, 20, 30]));
    }

    #[test]
    fn agent_keeps_apparent_radius() {
        let mut img = RgbImage::new(50, 50);
        draw_agent(&mut img, &solid_sprite(16, 16), GridPoint::new(25, 25), 0.0, 5).unwrap();
        let lit = img.pixels().filter(|p| p.0[0] > 0).count();
        assert_eq!(lit, 100);
        assert!(img.get_pixel(25, 25).0[0] > 0);
        assert_eq!(img.get_pixel(35, 25).0, [0, 0, 0]);
    }

    #[test]
    fn rotated_agent_keeps_area_not_box() {
        let mut img = RgbImage::new(50, 50);
        let angle = std::f32::consts::FRAC_PI_4;
        draw_agent(&mut img, &solid_sprite(16, 16), GridPoint::new(25, 25), angle, 5).unwrap();

        // 16 px sprite rotates onto a 23 px canvas, drawn at 5 * 2 * 23 / 16 = 14 px.
        let lit: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 127)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!((70..=130).contains(&lit.len()), "lit {}", lit.len());
        let min_x = lit.iter().map(|p| p.0).min().unwrap();
        let max_x = lit.iter().map(|p| p.0).max().unwrap();
        assert!((11..=14).contains(&(max_x - min_x + 1)));
        assert!(img.get_pixel(25, 25).0[0] > 200);
        // diamond corners stay background
        assert!(img.get_pixel(18, 18).0[0] < 64);
        assert!(img.get_pixel(31, 31).0[0] < 64);
    }

    #[test]
    fn unknown_agent_is_an_error() {
        let sprites = AgentSprites::new(vec![AgentSprites::arrow(9, Rgb([0, 255, 0]))]);
        let mut img = RgbImage::new(20, 20);
        assert!(sprites.draw(&mut img, 0, GridPoint::new(10, 10), 1.0, 4).is_ok());
        assert!(sprites.draw(&mut img, 1, GridPoint::new(10, 10), 1.0, 4).is_err());
    }
}
