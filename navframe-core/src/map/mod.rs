//! map — top-down map helpers: world→grid mapping, localization markers and
//! bird's-eye crops.
//!
//! Grid cells are addressed `(row, col)`, i.e. `(y, x)` in image terms. The
//! simulator's world frame is y-up, so the map's rows follow world `z` and its
//! columns follow world `x`.

use image::{Rgb, RgbImage};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::palette::MarkerKind;

/// Integer map cell. Coordinates may be negative or past the map edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub row: i64,
    pub col: i64,
}

impl GridPoint {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

/// Maps world positions onto a map of `(height, width)` cells.
pub trait GridMapper {
    fn to_grid(&self, position: &Vector3<f32>, map_size: (u32, u32)) -> GridPoint;
}

/// Navigable-area bounds of a scene, as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub lower: Vector3<f32>,
    pub upper: Vector3<f32>,
}

impl GridMapper for WorldBounds {
    fn to_grid(&self, position: &Vector3<f32>, (height, width): (u32, u32)) -> GridPoint {
        let extent = self.upper - self.lower;
        let cell_z = extent.z / height as f32;
        let cell_x = extent.x / width as f32;
        let rel = position - self.lower;
        GridPoint::new((rel.z / cell_z) as i64, (rel.x / cell_x) as i64)
    }
}

/// Clamp the half-open range `[start, end)` to `[0, limit)`.
fn clamp_range(start: i64, end: i64, limit: u32) -> std::ops::Range<i64> {
    start.max(0)..end.min(limit as i64)
}

/// Draw a hollow square marker centred on `cell`.
///
/// The outer square has half-size `max(h, w) / 100 + 1`; the centre patch of
/// half-size `(max(h, w) / 100) / 2` keeps its original pixels so the
/// underlying map cell stays visible. Parts beyond the map edge are dropped.
pub fn mark_cell(map: &mut RgbImage, cell: GridPoint, color: Rgb<u8>) {
    let (w, h) = map.dimensions();
    let padding = (w.max(h) / 100) as i64;
    let inner = padding / 2;

    let inner_rows = clamp_range(cell.row - inner, cell.row + inner + 1, h);
    let inner_cols = clamp_range(cell.col - inner, cell.col + inner + 1, w);
    let mut saved = Vec::new();
    for r in inner_rows.clone() {
        for c in inner_cols.clone() {
            saved.push(*map.get_pixel(c as u32, r as u32));
        }
    }

    for r in clamp_range(cell.row - padding - 1, cell.row + padding + 2, h) {
        for c in clamp_range(cell.col - padding - 1, cell.col + padding + 2, w) {
            map.put_pixel(c as u32, r as u32, color);
        }
    }

    let mut saved = saved.into_iter();
    for r in inner_rows {
        for c in inner_cols.clone() {
            if let Some(px) = saved.next() {
                map.put_pixel(c as u32, r as u32, px);
            }
        }
    }
}

/// Mark the map cell under world `position` with the colour of `kind`.
pub fn draw_localized(map: &mut RgbImage, position: &Vector3<f32>, mapper: &dyn GridMapper, kind: MarkerKind) {
    let (w, h) = map.dimensions();
    let cell = mapper.to_grid(position, (h, w));
    debug!(?kind, row = cell.row, col = cell.col, "localization marker");
    mark_cell(map, cell, kind.color());
}

/// Crop a `clip_size`×`clip_size` window centred on `pixel_pose`, filling any
/// part outside the map with zeros.
///
/// The window spans `[pose - clip_size/2, pose + clip_size/2)` on each axis,
/// so an odd `clip_size` leaves the last row and column zero.
pub fn clip_map_birdseye_view(image: &RgbImage, clip_size: u32, pixel_pose: GridPoint) -> RgbImage {
    let (w, h) = image.dimensions();
    let half = (clip_size / 2) as i64;
    let delta_row = pixel_pose.row - half;
    let delta_col = pixel_pose.col - half;
    let rows = clamp_range(delta_row, pixel_pose.row + half, h);
    let cols = clamp_range(delta_col, pixel_pose.col + half, w);

    let mut out = RgbImage::new(clip_size, clip_size);
    if rows.is_empty() || cols.is_empty() {
        warn!(
            map_w = w,
            map_h = h,
            row = pixel_pose.row,
            col = pixel_pose.col,
            clip_size,
            "clip window misses the map; returning blank view"
        );
        return out;
    }

    for r in rows {
        for c in cols.clone() {
            let px = *image.get_pixel(c as u32, r as u32);
            out.put_pixel((c - delta_col) as u32, (r - delta_row) as u32, px);
        }
    }
    out
}
