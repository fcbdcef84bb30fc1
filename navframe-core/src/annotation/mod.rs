//! annotation — bounding boxes, detections and their debug overlays
//!
//! Boxes arrive either in pixels or normalized to `[0, 1]`; normalized sets are
//! rescaled to the target image before drawing. Drawing never validates the
//! geometry: swapped corners are reordered and strokes leaving the image are
//! clipped by the line primitive.

use anyhow::{bail, ensure, Result};
use image::{Rgb, RgbImage};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::palette::CategoryTable;
use crate::text::put_text;

// ── Boxes ────────────────────────────────────────────────────────────────────

/// Axis-aligned box `(x_min, y_min, x_max, y_max)` in pixel or normalized
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "[f32; 4]")]
pub struct BBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Decode a 4-value row, or a 5-value row whose first column is a
    /// batch/index column.
    pub fn from_row(row: &[f32]) -> Result<Self> {
        match row {
            [x0, y0, x1, y1] | [_, x0, y0, x1, y1] => Ok(Self::new(*x0, *y0, *x1, *y1)),
            _ => bail!("box row must have 4 or 5 values, got {}", row.len()),
        }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    fn max_coord(&self) -> f32 {
        self.x_min.max(self.y_min).max(self.x_max).max(self.y_max)
    }

    fn coord_sum(&self) -> f32 {
        self.x_min + self.y_min + self.x_max + self.y_max
    }

    /// `true` when the box carries any non-zero extent (padding rows are all
    /// zero).
    pub fn is_present(&self) -> bool {
        self.coord_sum() > 0.0
    }

    fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x_min * sx, self.y_min * sy, self.x_max * sx, self.y_max * sy)
    }
}

impl TryFrom<Vec<f32>> for BBox {
    type Error = anyhow::Error;

    fn try_from(row: Vec<f32>) -> Result<Self> {
        Self::from_row(&row)
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x_min, b.y_min, b.x_max, b.y_max]
    }
}

/// Rescale a box set to pixels when every coordinate is `<= 1`.
pub fn normalize_boxes(boxes: &[BBox], width: u32, height: u32) -> Vec<BBox> {
    let max = boxes.iter().map(BBox::max_coord).fold(f32::MIN, f32::max);
    if boxes.is_empty() || max > 1.0 {
        return boxes.to_vec();
    }
    boxes
        .iter()
        .map(|b| b.scaled(width as f32, height as f32))
        .collect()
}

/// Detector output for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub boxes: Vec<BBox>,
    pub categories: Vec<usize>,
    #[serde(default)]
    pub scores: Vec<f32>,
}

impl Detections {
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Keep the detections scoring at least `threshold`. Missing scores count
    /// as passing.
    pub fn above(&self, threshold: f32) -> Detections {
        let mut out = Detections::default();
        for (i, (bbox, cat)) in self.boxes.iter().zip(&self.categories).enumerate() {
            let score = self.scores.get(i).copied().unwrap_or(1.0);
            if score >= threshold {
                out.boxes.push(*bbox);
                out.categories.push(*cat);
                out.scores.push(score);
            }
        }
        out
    }
}

// ── Styles ───────────────────────────────────────────────────────────────────

/// Where the outline colour comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeColor {
    Fixed(Rgb<u8>),
    /// Colour of each box's category in the label table.
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStyle {
    pub stroke: StrokeColor,
    /// Outline width in pixels, centred on the box edge.
    pub thickness: u32,
    pub label_color: Rgb<u8>,
    /// Label font scale as a fraction of the image height.
    pub label_scale: f32,
}

impl BoxStyle {
    /// Thin fixed-colour outlines with small labels.
    pub fn plain(color: Rgb<u8>) -> Self {
        Self {
            stroke: StrokeColor::Fixed(color),
            thickness: 1,
            label_color: Rgb([183, 115, 48]),
            label_scale: 1e-3,
        }
    }

    /// Thick outlines in category colours with large yellow labels.
    pub fn categorical() -> Self {
        Self {
            stroke: StrokeColor::Category,
            thickness: 3,
            label_color: Rgb([255, 255, 0]),
            label_scale: 5e-3,
        }
    }
}

impl Default for BoxStyle {
    fn default() -> Self {
        Self::plain(Rgb([178, 193, 118]))
    }
}

// ── Drawing ──────────────────────────────────────────────────────────────────

/// Outline the box with corners `(x0, y0)`–`(x1, y1)` (inclusive) using a
/// stroke `thickness` pixels wide. Edges outside the image are dropped.
fn draw_thick_rect(image: &mut RgbImage, corners: (i64, i64, i64, i64), thickness: u32, color: Rgb<u8>) {
    let (iw, ih) = (image.width() as i64, image.height() as i64);
    let t = thickness.clamp(1, 3) as i64;
    // Pulled in just past the stroke reach so off-image edges stay off-image.
    let cx = |v: i64| v.clamp(-t - 1, iw + t);
    let cy = |v: i64| v.clamp(-t - 1, ih + t);
    let (ax, ay, bx, by) = corners;
    let (x0, x1) = (cx(ax.min(bx)), cx(ax.max(bx)));
    let (y0, y1) = (cy(ay.min(by)), cy(ay.max(by)));

    for k in -(t - 1) / 2..=t / 2 {
        let w = x1 - x0 + 1 + 2 * k;
        let h = y1 - y0 + 1 + 2 * k;
        if w <= 0 || h <= 0 {
            continue;
        }
        let rect = Rect::at((x0 - k) as i32, (y0 - k) as i32).of_size(w as u32, h as u32);
        imageproc::drawing::draw_hollow_rect_mut(image, rect, color);
    }
}

/// Pixel corners of `bbox`; `as` saturates, so non-finite or huge values
/// land far outside any image.
fn pixel_corners(bbox: &BBox) -> (i64, i64, i64, i64) {
    (
        bbox.x_min as i64,
        bbox.y_min as i64,
        bbox.x_max as i64,
        bbox.y_max as i64,
    )
}

fn text_coord(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Draw one outline per box, with a category label when `categories` is
/// non-empty.
///
/// Labels and per-category colours are resolved through `table`; an unknown
/// id (or a missing table when one is needed) is an error. Normalized box
/// sets are rescaled to the image first.
pub fn draw_bbox(
    image: &mut RgbImage,
    boxes: &[BBox],
    categories: &[usize],
    table: Option<&CategoryTable>,
    style: &BoxStyle,
) -> Result<()> {
    let (w, h) = image.dimensions();
    let boxes = normalize_boxes(boxes, w, h);
    let labelled = !categories.is_empty();
    if labelled || style.stroke == StrokeColor::Category {
        ensure!(
            categories.len() >= boxes.len(),
            "{} boxes but only {} categories",
            boxes.len(),
            categories.len()
        );
    }

    let table_for = |what: &str| match table {
        Some(t) => Ok(t),
        None => Err(anyhow::anyhow!("{what} requires a category table")),
    };

    for (i, bbox) in boxes.iter().enumerate() {
        let color = match style.stroke {
            StrokeColor::Fixed(c) => c,
            StrokeColor::Category => table_for("category colouring")?.color(categories[i])?,
        };
        let corners = pixel_corners(bbox);
        draw_thick_rect(image, corners, style.thickness, color);

        if labelled {
            let label = table_for("labelling")?.label(categories[i])?;
            put_text(
                image,
                label,
                (text_coord(corners.0), text_coord(corners.1 + 10)),
                style.label_scale * h as f32,
                style.label_color,
            );
        }
    }
    debug!(boxes = boxes.len(), labelled, "drew boxes");
    Ok(())
}

/// Plain outlines, no labels.
pub fn draw_rois(image: &mut RgbImage, rois: &[BBox], color: Rgb<u8>, thickness: u32) {
    for roi in rois {
        draw_thick_rect(image, pixel_corners(roi), thickness, color);
    }
}

// ── ROI rows ─────────────────────────────────────────────────────────────────

/// How to read ROI rows produced by detection heads: optional leading
/// columns (batch index) followed by four coordinates, optionally scaled from
/// a feature grid up to image pixels. A trailing column, when present after
/// the coordinates, is the class id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiLayout {
    pub skip_leading: usize,
    pub scale: f32,
}

impl RoiLayout {
    pub const PLAIN: RoiLayout = RoiLayout {
        skip_leading: 0,
        scale: 1.0,
    };

    pub const INDEXED: RoiLayout = RoiLayout {
        skip_leading: 1,
        scale: 1.0,
    };

    /// Indexed rows on a `grid`-sized feature map, mapped onto `image_size`
    /// pixels.
    pub fn feature_grid(grid: u32, image_size: u32) -> Self {
        Self {
            skip_leading: 1,
            scale: image_size as f32 / grid as f32,
        }
    }

    pub fn decode(&self, row: &[f32]) -> Result<BBox> {
        let s = self.skip_leading;
        ensure!(
            row.len() >= s + 4,
            "roi row has {} values, layout needs {}",
            row.len(),
            s + 4
        );
        Ok(BBox::new(row[s], row[s + 1], row[s + 2], row[s + 3]).scaled(self.scale, self.scale))
    }

    /// Class id stored in the last column, if the row has one beyond the
    /// coordinates.
    pub fn class_of(&self, row: &[f32]) -> Option<usize> {
        if row.len() > self.skip_leading + 4 {
            row.last().map(|c| *c as usize)
        } else {
            None
        }
    }
}
