//! sequence — frame sequences and their GIF/PNG output
//!
//! Builders here turn per-step episode records into ordered frame lists;
//! frames are independent, so they render in parallel and are written out in
//! order. Output files are whatever the `image` codecs produce; there is no
//! format contract beyond "a GIF" or "a PNG".

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, GenericImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::annotation::{draw_rois, RoiLayout};
use crate::palette::CategoryTable;
use crate::text::{put_text, text_size};

/// Times the final frame is repeated so the result lingers in a GIF.
const FINAL_FRAME_REPEATS: usize = 3;
/// Length of the follower's action arrow, in pixels.
const ACTION_ARROW_LEN: f32 = 40.0;
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

// ── Sequence + output ────────────────────────────────────────────────────────

/// Ordered frames produced by one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSequence {
    frames: Vec<RgbImage>,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: RgbImage) {
        self.frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<RgbImage> {
        self.frames
    }

    /// Write an endlessly looping GIF with `frame_delay_ms` between frames.
    pub fn save_gif<P: AsRef<Path>>(&self, path: P, frame_delay_ms: u32) -> Result<()> {
        self.save_gif_with_progress(path, frame_delay_ms, |_, _| {})
    }

    /// Same as [`FrameSequence::save_gif`] but calls `progress_fn(written,
    /// total)` after every frame.
    pub fn save_gif_with_progress<P, F>(&self, path: P, frame_delay_ms: u32, mut progress_fn: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnMut(u64, u64),
    {
        let path = path.as_ref();
        ensure!(!self.frames.is_empty(), "no frames to write to {}", path.display());

        let file = File::create(path).with_context(|| format!("could not create {}", path.display()))?;
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder
            .set_repeat(Repeat::Infinite)
            .context("failed to set GIF repeat")?;

        let total = self.frames.len() as u64;
        let delay = Delay::from_numer_denom_ms(frame_delay_ms, 1);
        for (i, frame) in self.frames.iter().enumerate() {
            let rgba = DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
            encoder
                .encode_frame(image::Frame::from_parts(rgba, 0, 0, delay))
                .with_context(|| format!("failed to encode GIF frame {i}"))?;
            progress_fn(i as u64 + 1, total);
        }
        info!(frames = total, path = %path.display(), "wrote GIF");
        Ok(())
    }

    /// Write every frame as `{prefix}_{index}.png`, returning the paths.
    pub fn save_pngs<P: AsRef<Path>>(&self, prefix: P) -> Result<Vec<PathBuf>> {
        let prefix = prefix.as_ref().to_string_lossy().into_owned();
        self.frames
            .iter()
            .enumerate()
            .map(|(t, frame)| {
                let path = PathBuf::from(format!("{prefix}_{t}.png"));
                save_png(frame, &path)?;
                Ok(path)
            })
            .collect()
    }
}

impl From<Vec<RgbImage>> for FrameSequence {
    fn from(frames: Vec<RgbImage>) -> Self {
        Self::new(frames)
    }
}

pub fn save_png<P: AsRef<Path>>(image: &RgbImage, path: P) -> Result<()> {
    let path = path.as_ref();
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "wrote PNG");
    Ok(())
}

// ── Follower episodes ────────────────────────────────────────────────────────

/// Per-step record of a follower episode.
#[derive(Debug, Clone, Default)]
pub struct FollowerRecord {
    /// Index of the memory image the follower is matched to at each step.
    pub eta: Vec<usize>,
    pub follower_images: Vec<RgbImage>,
    /// 0 forward, 1 left, 2 right; anything else is drawn as forward.
    pub follower_actions: Vec<u8>,
    pub dist2goal: Vec<f32>,
}

fn action_direction(action: u8) -> f32 {
    match action {
        1 => 1.0,
        2 => -1.0,
        _ => 0.0,
    }
}

/// Memory image | follower view, one frame per step, with the action arrow
/// and step/distance captions. `result` captions the last step, and the last
/// frame is repeated so the outcome stays on screen.
pub fn follower_gif(
    record: &FollowerRecord,
    memory_images: &[RgbImage],
    img_size: u32,
    result: &str,
) -> Result<FrameSequence> {
    let steps = record.eta.len();
    ensure!(
        record.follower_images.len() >= steps
            && record.follower_actions.len() >= steps
            && record.dist2goal.len() >= steps,
        "follower record is shorter than its {steps} eta entries"
    );

    let mut frames: Vec<RgbImage> = (0..steps)
        .into_par_iter()
        .map(|t| -> Result<RgbImage> {
            let memory = memory_images
                .get(record.eta[t])
                .with_context(|| format!("eta {} has no memory image", record.eta[t]))?;
            let mut current = record.follower_images[t].clone();
            ensure!(
                memory.dimensions() == (img_size, img_size) && current.dimensions() == (img_size, img_size),
                "step {t}: images must be {img_size}x{img_size}"
            );

            let half = (img_size / 2) as f32;
            let bottom = img_size as f32;
            let dir = action_direction(record.follower_actions[t]);
            for dx in [-1.0, 0.0, 1.0] {
                draw_line_segment_mut(
                    &mut current,
                    (half + dx, bottom),
                    (half - ACTION_ARROW_LEN * dir + dx, bottom - ACTION_ARROW_LEN),
                    GREEN,
                );
            }
            put_text(&mut current, &format!("length: {t:02}"), (10, 20), 0.6, RED);
            put_text(
                &mut current,
                &format!("dist2goal: {:.3}", record.dist2goal[t]),
                (10, 40),
                0.6,
                RED,
            );
            if t + 1 == steps {
                put_text(&mut current, result, (10, 80), 0.6, RED);
            }

            let mut out = RgbImage::new(img_size * 2, img_size);
            out.copy_from(memory, 0, 0)?;
            out.copy_from(&current, img_size, 0)?;
            Ok(out)
        })
        .collect::<Result<_>>()?;

    if let Some(last) = frames.last().cloned() {
        frames.extend(std::iter::repeat(last).take(FINAL_FRAME_REPEATS));
    }
    debug!(steps, frames = frames.len(), "built follower frames");
    Ok(FrameSequence::new(frames))
}

// ── Correspondence arrows ────────────────────────────────────────────────────

/// Matches between a demo panel and a query panel at one step.
///
/// Both panels are split into the same `rows × cols` grid. `arrows[j][i]` is
/// the flat index (`row * cols + col`) of the query cell matched to demo cell
/// `(j, i)`; only cells with `good[j][i]` are drawn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrespondenceStep {
    pub demo_index: usize,
    pub arrows: Vec<Vec<usize>>,
    pub good: Vec<Vec<bool>>,
}

/// Demo | query side by side with green arrows joining matched cell centres.
pub fn correspondence_frames(
    query: &[RgbImage],
    demo: &[RgbImage],
    steps: &[CorrespondenceStep],
) -> Result<FrameSequence> {
    ensure!(query.len() >= steps.len(), "fewer query frames than steps");

    let frames = steps
        .par_iter()
        .zip(query.par_iter())
        .enumerate()
        .map(|(t, (step, q))| -> Result<RgbImage> {
            let d = demo
                .get(step.demo_index)
                .with_context(|| format!("step {t}: no demo frame {}", step.demo_index))?;
            let (pw, ph) = q.dimensions();
            ensure!(d.dimensions() == (pw, ph), "step {t}: demo and query panels differ in size");

            let mut out = RgbImage::new(pw * 2, ph);
            out.copy_from(d, 0, 0)?;
            out.copy_from(q, pw, 0)?;

            let rows = step.arrows.len();
            let cols = step.arrows.first().map_or(0, Vec::len);
            if rows == 0 || cols == 0 {
                return Ok(out);
            }
            let cell_w = pw as f32 / cols as f32;
            let cell_h = ph as f32 / rows as f32;
            let centre = |row: usize, col: usize, x0: f32| {
                (
                    (x0 + cell_w * col as f32 + cell_w / 2.0) as i32,
                    (cell_h * row as f32 + cell_h / 2.0) as i32,
                )
            };

            for (j, row) in step.arrows.iter().enumerate() {
                for (i, &target) in row.iter().enumerate() {
                    if !step.good.get(j).and_then(|g| g.get(i)).copied().unwrap_or(false) {
                        continue;
                    }
                    let start = centre(j, i, 0.0);
                    let end = centre(target / cols, target % cols, pw as f32);
                    draw_hollow_circle_mut(&mut out, start, 1, GREEN);
                    draw_hollow_circle_mut(&mut out, end, 1, GREEN);
                    draw_line_segment_mut(
                        &mut out,
                        (start.0 as f32, start.1 as f32),
                        (end.0 as f32, end.1 as f32),
                        GREEN,
                    );
                }
            }
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FrameSequence::new(frames))
}

// ── Detection overlays ───────────────────────────────────────────────────────

/// Blend a translucent blue tag behind `label` and write it in black.
fn draw_roi_label(image: &mut RgbImage, label: &str, origin: (i32, i32)) {
    const SCALE: f32 = 0.5;
    const ALPHA: f32 = 0.3;
    let (tw, th) = text_size(label, SCALE);
    let (w, h) = image.dimensions();
    let top = origin.1 - th as i32;
    for y in top.max(0)..(origin.1 + 2).min(h as i32) {
        for x in origin.0.max(0)..(origin.0 + tw as i32 + 2).min(w as i32) {
            let px = image.get_pixel_mut(x as u32, y as u32);
            let blue = [0.0, 0.0, 255.0];
            for c in 0..3 {
                px.0[c] = (ALPHA * blue[c] + (1.0 - ALPHA) * px.0[c] as f32) as u8;
            }
        }
    }
    put_text(image, label, (origin.0 + 1, origin.1), SCALE, Rgb([0, 0, 0]));
}

/// Red 2-px ROI outlines on each image, labelled with their class when
/// `labels` is given and the row carries a class column.
pub fn detection_frames(
    images: &[RgbImage],
    rois: &[Vec<Vec<f32>>],
    layout: RoiLayout,
    labels: Option<&CategoryTable>,
) -> Result<FrameSequence> {
    ensure!(
        rois.len() >= images.len(),
        "{} images but ROIs for only {}",
        images.len(),
        rois.len()
    );
    let frames = images
        .par_iter()
        .zip(rois.par_iter())
        .map(|(image, rows)| -> Result<RgbImage> {
            let mut out = image.clone();
            let boxes = rows
                .iter()
                .map(|r| layout.decode(r))
                .collect::<Result<Vec<_>>>()?;
            draw_rois(&mut out, &boxes, RED, 2);
            if let Some(table) = labels {
                for (row, bbox) in rows.iter().zip(&boxes) {
                    if let Some(class) = layout.class_of(row) {
                        draw_roi_label(&mut out, table.label(class)?, (bbox.x_min as i32, bbox.y_min as i32));
                    }
                }
            }
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(FrameSequence::new(frames))
}
