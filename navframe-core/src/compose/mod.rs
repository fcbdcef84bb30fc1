//! compose — assemble one debug frame from a simulator step.
//!
//! Layout: the egocentric views (current observation, then the goal views)
//! stacked vertically in panoramic mode or side by side otherwise, scaled,
//! with the top-down map resized to the same height on the right.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::annotation::{draw_bbox, BoxStyle, Detections};
use crate::config::{ComposeOptions, TaskKind, ViewMode};
use crate::map::{draw_localized, GridMapper};
use crate::palette::{CategoryTable, LabelTables, MarkerKind};
use crate::rendering::{draw_collision, hstack, vstack, FrameRenderer, Resampling, COLLISION_ALPHA};
use crate::text::put_text;

const CAPTION_ORIGIN: (i32, i32) = (5, 10);
const CAPTION_SCALE: f32 = 0.4;
const CAPTION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// ── Step data ────────────────────────────────────────────────────────────────

/// Sensor observation of one step. Absent sensors are `None` / empty.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub rgb: Option<RgbImage>,
    pub panoramic_rgb: Option<RgbImage>,
    /// Objects detected in the current view.
    pub objects: Option<Detections>,
    /// Goal images with values in `[0, 1]`, one per target.
    pub target_goal: Vec<Rgb32FImage>,
    /// Per-target boxes on the goal views (multi-target episodes).
    pub target_loc_objects: Option<Detections>,
    /// Target object boxes on the goal view (single-target episodes).
    pub target_object: Option<Detections>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collisions {
    pub is_collision: bool,
}

/// Top-down map with the world positions of its graph nodes.
#[derive(Debug, Clone, Default)]
pub struct TopDownMap {
    pub map: RgbImage,
    pub node_list: Vec<Vector3<f32>>,
    pub object_node_list: Vec<Vector3<f32>>,
}

/// The step info's map entry: present but empty renders a black square.
#[derive(Debug, Clone)]
pub enum TopDownMapSlot {
    Blank,
    Map(TopDownMap),
}

/// Step metadata reported alongside the observation.
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    pub collisions: Option<Collisions>,
    pub top_down_map: Option<TopDownMapSlot>,
    /// Per-target success flags (1.0 once reached); reached goals render black.
    pub total_success: Vec<f32>,
}

/// Policy attention scores used to place localization markers.
///
/// `goal` and `curr` score graph nodes; `goal_obj` and `curr_obj` are
/// `[query, object_node]` matrices whose column maxima score object nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attention {
    pub goal: Vec<f32>,
    pub curr: Vec<f32>,
    pub curr_obj: Vec<Vec<f32>>,
    pub goal_obj: Vec<Vec<f32>>,
}

fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Index of the column holding the largest column maximum.
fn column_argmax(rows: &[Vec<f32>]) -> Option<usize> {
    let cols = rows.first()?.len();
    let maxima: Vec<f32> = (0..cols)
        .map(|c| {
            rows.iter()
                .filter_map(|r| r.get(c).copied())
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .collect();
    argmax(&maxima)
}

/// Scale float goal images to 8 bits, black out reached goals, and stack them
/// top to bottom.
fn stack_goals(goals: &[Rgb32FImage], total_success: &[f32]) -> Result<RgbImage> {
    let views: Vec<RgbImage> = goals
        .iter()
        .enumerate()
        .map(|(i, goal)| {
            let keep = 1.0 - total_success.get(i).copied().unwrap_or(0.0);
            ImageBuffer::from_fn(goal.width(), goal.height(), |x, y| {
                let p = goal.get_pixel(x, y).0;
                Rgb(p.map(|v| (v * 255.0 * keep).clamp(0.0, 255.0) as u8))
            })
        })
        .collect();
    vstack(&views).context("goal images must share a width")
}

// ── Composer ─────────────────────────────────────────────────────────────────

/// Frame composer holding the options, label tables and a resize context.
pub struct Composer {
    renderer: FrameRenderer,
    options: ComposeOptions,
    tables: LabelTables,
    prof_frames: u64,
    prof_compose: Duration,
}

impl Composer {
    pub fn new(options: ComposeOptions, tables: LabelTables) -> Self {
        Self {
            renderer: FrameRenderer::new(),
            options,
            tables,
            prof_frames: 0,
            prof_compose: Duration::ZERO,
        }
    }

    pub fn options(&self) -> &ComposeOptions {
        &self.options
    }

    fn labels(&self) -> Result<&CategoryTable> {
        self.tables
            .select(&self.options.dataset_name, self.options.use_detector)
    }

    /// Build the frame for one step, or `None` when the step carries neither
    /// an egocentric view nor a map entry.
    pub fn compose(
        &mut self,
        observation: &Observation,
        info: &StepInfo,
        localization: Option<(&Attention, &dyn GridMapper)>,
    ) -> Result<Option<RgbImage>> {
        let start = Instant::now();
        let frame = self.compose_inner(observation, info, localization);
        self.prof_compose += start.elapsed();
        self.prof_frames += 1;

        if self.prof_frames % 300 == 0 {
            info!(
                frames = self.prof_frames,
                compose_ms_per_frame = format!(
                    "{:.2}",
                    self.prof_compose.as_secs_f64() * 1000.0 / self.prof_frames as f64
                ),
                "compose timings"
            );
        }
        frame
    }

    fn compose_inner(
        &mut self,
        observation: &Observation,
        info: &StepInfo,
        localization: Option<(&Attention, &dyn GridMapper)>,
    ) -> Result<Option<RgbImage>> {
        let mut views = Vec::with_capacity(2);
        if let Some(current) = self.current_view(observation)? {
            views.push(current);
        }
        if let Some(goal) = self.goal_view(observation, info)? {
            views.push(goal);
        }

        let mut frame = if views.is_empty() {
            None
        } else {
            let mut ego = match self.options.mode {
                ViewMode::Panoramic => vstack(&views),
                ViewMode::Single => hstack(&views),
            }
            .context("egocentric views do not line up")?;
            if info.collisions.is_some_and(|c| c.is_collision) {
                draw_collision(&mut ego, COLLISION_ALPHA);
            }
            let (fx, fy) = self.options.egocentric_scale;
            Some(self.renderer.scale_by(&ego, fx, fy, Resampling::Bilinear)?)
        };

        if let Some(slot) = &info.top_down_map {
            let map = self.map_view(slot, frame.as_ref().map(RgbImage::height), localization)?;
            frame = Some(match frame {
                Some(f) => hstack(&[f, map]).context("map does not match frame height")?,
                None => map,
            });
        }

        if let Some(f) = &frame {
            debug!(width = f.width(), height = f.height(), "composed frame");
        }
        Ok(frame)
    }

    fn current_view(&self, observation: &Observation) -> Result<Option<RgbImage>> {
        let source = match self.options.mode {
            ViewMode::Panoramic => observation.panoramic_rgb.as_ref(),
            ViewMode::Single => observation.rgb.as_ref(),
        };
        let Some(source) = source else {
            return Ok(None);
        };

        let mut rgb = source.clone();
        if self.options.draw_object {
            if let Some(objects) = &observation.objects {
                let kept = objects.above(self.options.object_score_threshold);
                if !kept.is_empty() {
                    draw_bbox(
                        &mut rgb,
                        &kept.boxes,
                        &kept.categories,
                        Some(self.labels()?),
                        &BoxStyle::categorical(),
                    )?;
                }
            }
        }
        put_text(&mut rgb, "current obs", CAPTION_ORIGIN, CAPTION_SCALE, CAPTION_COLOR);
        Ok(Some(rgb))
    }

    /// Goal images with their target annotations. Every goal view carries a
    /// caption: single-target image-goal steps with boxes still get the plain
    /// `target_obs` label.
    fn goal_view(&self, observation: &Observation, info: &StepInfo) -> Result<Option<RgbImage>> {
        if observation.target_goal.is_empty() {
            return Ok(None);
        }
        let mut goal = stack_goals(&observation.target_goal, &info.total_success)?;
        let style = BoxStyle::categorical();
        let mut captioned = false;

        if self.options.multi_target {
            if let Some(targets) = &observation.target_loc_objects {
                let table = self.labels()?;
                let mut names = Vec::new();
                for (bbox, &cat) in targets.boxes.iter().zip(&targets.categories) {
                    if !bbox.is_present() {
                        continue;
                    }
                    draw_bbox(&mut goal, &[*bbox], &[cat], Some(table), &style)?;
                    names.push(table.label(cat)?);
                }
                let caption = format!("target obs: {}", names.join(", "));
                put_text(&mut goal, &caption, CAPTION_ORIGIN, CAPTION_SCALE, CAPTION_COLOR);
                captioned = true;
            }
        } else if let Some(target) = &observation.target_object {
            let table = self.labels()?;
            draw_bbox(&mut goal, &target.boxes, &target.categories, Some(table), &style)?;
            if self.options.task == TaskKind::ObjTarget {
                if let Some(&cat) = target.categories.first() {
                    let caption = format!("target_obs: {}", table.label(cat)?);
                    put_text(&mut goal, &caption, CAPTION_ORIGIN, CAPTION_SCALE, CAPTION_COLOR);
                    captioned = true;
                }
            }
        }

        if !captioned {
            put_text(&mut goal, "target_obs", CAPTION_ORIGIN, CAPTION_SCALE, CAPTION_COLOR);
        }
        Ok(Some(goal))
    }

    fn map_view(
        &mut self,
        slot: &TopDownMapSlot,
        frame_height: Option<u32>,
        localization: Option<(&Attention, &dyn GridMapper)>,
    ) -> Result<RgbImage> {
        let tdm = match slot {
            TopDownMapSlot::Blank => {
                let side = frame_height.unwrap_or(self.options.blank_map_size);
                return Ok(RgbImage::new(side, side));
            }
            TopDownMapSlot::Map(tdm) => tdm,
        };

        let mut map = tdm.map.clone();
        if let Some((attention, mapper)) = localization {
            localize(&mut map, tdm, attention, mapper);
        }

        let Some(height) = frame_height else {
            return Ok(map);
        };
        let (old_w, old_h) = map.dimensions();
        let width = ((height as f32 / old_h as f32 * old_w as f32) as u32).max(1);
        self.renderer
            .resize_rgb(&map, width, height, Resampling::CatmullRom)
            .context("failed to scale top-down map")
    }
}

/// Draw the attention-predicted node markers. A marker whose scores or node
/// lookup are unavailable is skipped.
fn localize(map: &mut RgbImage, tdm: &TopDownMap, attention: &Attention, mapper: &dyn GridMapper) {
    let picks = [
        (argmax(&attention.goal), &tdm.node_list, MarkerKind::GoalNode),
        (argmax(&attention.curr), &tdm.node_list, MarkerKind::CurrentNode),
        (column_argmax(&attention.curr_obj), &tdm.object_node_list, MarkerKind::CurrentObject),
        (column_argmax(&attention.goal_obj), &tdm.object_node_list, MarkerKind::GoalObject),
    ];
    for (index, nodes, kind) in picks {
        match index.and_then(|i| nodes.get(i)) {
            Some(position) => draw_localized(map, position, mapper, kind),
            None => debug!(?kind, ?index, nodes = nodes.len(), "skipping localization marker"),
        }
    }
}

/// One-shot [`Composer::compose`].
pub fn observations_to_image(
    observation: &Observation,
    info: &StepInfo,
    options: &ComposeOptions,
    tables: &LabelTables,
    localization: Option<(&Attention, &dyn GridMapper)>,
) -> Result<Option<RgbImage>> {
    Composer::new(options.clone(), tables.clone()).compose(observation, info, localization)
}
