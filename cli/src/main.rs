use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use nalgebra::Vector3;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use navframe_core::{
    agent::{AgentSprites, DEFAULT_AGENT_RADIUS},
    annotation::{draw_bbox, BoxStyle, Detections},
    compose::{Attention, Collisions, Composer, Observation, StepInfo, TopDownMap, TopDownMapSlot},
    config::{load_label_tables, load_options},
    map::{clip_map_birdseye_view, GridMapper, GridPoint, WorldBounds},
    palette::LabelTables,
    sequence::{save_png, FrameSequence},
    text::append_text_to_image,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "navframe",
    version,
    about = "Debug frame rendering for navigation episodes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BoxPreset {
    /// Thin outlines in one colour
    Plain,
    /// Thick outlines in category colours
    Categorical,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a wrapped caption under an image.
    Caption {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        text: String,

        #[arg(long, default_value_t = 0.5)]
        font_size: f32,

        #[arg(short, long, default_value = "caption.png")]
        output: PathBuf,
    },

    /// Draw boxes from a detections JSON file.
    Boxes {
        #[arg(short, long)]
        input: PathBuf,

        /// Detections JSON: {"boxes": [[x0, y0, x1, y1], ...], "categories": [...]}
        #[arg(short, long)]
        boxes: PathBuf,

        /// Label tables JSON; without it boxes are drawn unlabelled
        #[arg(long)]
        labels: Option<PathBuf>,

        #[arg(long, default_value = "gibson")]
        dataset: String,

        #[arg(long)]
        use_detector: bool,

        #[arg(long, value_enum, default_value_t = BoxPreset::Plain)]
        style: BoxPreset,

        #[arg(short, long, default_value = "boxes.png")]
        output: PathBuf,
    },

    /// Crop a square window of a top-down map around a pixel pose.
    Clip {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        size: u32,

        #[arg(long)]
        row: i64,

        #[arg(long)]
        col: i64,

        #[arg(short, long, default_value = "clip.png")]
        output: PathBuf,
    },

    /// Draw the agent sprite onto a map.
    Agent {
        #[arg(short, long)]
        input: PathBuf,

        /// RGBA sprite; a green arrow is used when omitted
        #[arg(long)]
        sprite: Option<PathBuf>,

        #[arg(long)]
        row: i64,

        #[arg(long)]
        col: i64,

        /// Heading in radians
        #[arg(long, default_value_t = 0.0)]
        rotation: f32,

        #[arg(long, default_value_t = DEFAULT_AGENT_RADIUS)]
        radius: u32,

        #[arg(short, long, default_value = "agent.png")]
        output: PathBuf,
    },

    /// Compose one debug frame from a step manifest.
    Compose {
        /// Step manifest JSON (image paths, detections, map, attention)
        #[arg(short, long)]
        step: PathBuf,

        /// Compose options JSON
        #[arg(long)]
        options: Option<PathBuf>,

        /// Label tables JSON
        #[arg(long)]
        labels: Option<PathBuf>,

        #[arg(short, long, default_value = "frame.png")]
        output: PathBuf,
    },

    /// Assemble PNG frames into a looping GIF.
    Gif {
        /// Frames, in order
        #[arg(required = true)]
        frames: Vec<PathBuf>,

        #[arg(long, default_value_t = 100)]
        delay_ms: u32,

        #[arg(short, long, default_value = "episode.gif")]
        output: PathBuf,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Caption {
            input,
            text,
            font_size,
            output,
        } => cmd_caption(input, text, font_size, output),
        Commands::Boxes {
            input,
            boxes,
            labels,
            dataset,
            use_detector,
            style,
            output,
        } => cmd_boxes(input, boxes, labels, &dataset, use_detector, style, output),
        Commands::Clip {
            input,
            size,
            row,
            col,
            output,
        } => cmd_clip(input, size, GridPoint::new(row, col), output),
        Commands::Agent {
            input,
            sprite,
            row,
            col,
            rotation,
            radius,
            output,
        } => cmd_agent(input, sprite, GridPoint::new(row, col), rotation, radius, output),
        Commands::Compose {
            step,
            options,
            labels,
            output,
        } => cmd_compose(step, options, labels, output),
        Commands::Gif {
            frames,
            delay_ms,
            output,
        } => cmd_gif(frames, delay_ms, output),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn cmd_caption(input: PathBuf, text: String, font_size: f32, output: PathBuf) -> Result<()> {
    let image = open_rgb(&input)?;
    let out = append_text_to_image(&image, &text, font_size);
    info!(height = out.height(), output = %output.display(), "captioned");
    save_png(&out, &output)
}

fn cmd_boxes(
    input: PathBuf,
    boxes: PathBuf,
    labels: Option<PathBuf>,
    dataset: &str,
    use_detector: bool,
    style: BoxPreset,
    output: PathBuf,
) -> Result<()> {
    let mut image = open_rgb(&input)?;
    let detections: Detections = read_json(&boxes)?;
    let tables = labels.map(load_label_tables).transpose()?;
    let table = tables
        .as_ref()
        .map(|t| t.select(dataset, use_detector))
        .transpose()?;

    let style = match style {
        BoxPreset::Plain => BoxStyle::default(),
        BoxPreset::Categorical => BoxStyle::categorical(),
    };
    // Without a table there is nothing to label with.
    let categories: &[usize] = if table.is_some() {
        &detections.categories
    } else {
        &[]
    };
    draw_bbox(&mut image, &detections.boxes, categories, table, &style)?;
    info!(boxes = detections.len(), output = %output.display(), "drew boxes");
    save_png(&image, &output)
}

fn cmd_clip(input: PathBuf, size: u32, pose: GridPoint, output: PathBuf) -> Result<()> {
    let map = open_rgb(&input)?;
    let clip = clip_map_birdseye_view(&map, size, pose);
    save_png(&clip, &output)
}

fn cmd_agent(
    input: PathBuf,
    sprite: Option<PathBuf>,
    center: GridPoint,
    rotation: f32,
    radius: u32,
    output: PathBuf,
) -> Result<()> {
    let mut map = open_rgb(&input)?;
    let sprites = match sprite {
        Some(path) => AgentSprites::load([path])?,
        None => AgentSprites::new(vec![AgentSprites::arrow(64, Rgb([0, 200, 0]))]),
    };
    sprites.draw(&mut map, 0, center, rotation, radius)?;
    save_png(&map, &output)
}

fn cmd_compose(
    step: PathBuf,
    options: Option<PathBuf>,
    labels: Option<PathBuf>,
    output: PathBuf,
) -> Result<()> {
    info!("Compose");
    info!("  step   : {}", step.display());
    info!("  output : {}", output.display());

    let options = options.map(load_options).transpose()?.unwrap_or_default();
    let tables = labels
        .map(load_label_tables)
        .transpose()?
        .unwrap_or_else(LabelTables::default);
    let manifest: StepManifest = read_json(&step)?;
    let base = step.parent().unwrap_or(Path::new("."));
    let (observation, info) = manifest.load(base)?;

    let mut composer = Composer::new(options, tables);
    let mapper = manifest.bounds.map(|b| Box::new(b) as Box<dyn GridMapper>);
    let localization = match (&manifest.attention, &mapper) {
        (Some(attention), Some(mapper)) => Some((attention, mapper.as_ref())),
        _ => None,
    };

    let frame = composer
        .compose(&observation, &info, localization)?
        .context("step has nothing to display")?;
    save_png(&frame, &output)
}

fn cmd_gif(frames: Vec<PathBuf>, delay_ms: u32, output: PathBuf) -> Result<()> {
    info!("GIF: {} frames -> {}", frames.len(), output.display());

    let sequence = frames
        .iter()
        .map(|p| open_rgb(p))
        .collect::<Result<Vec<_>>>()
        .map(FrameSequence::new)?;

    let pb = progress_bar(sequence.len() as u64, "Encoding GIF…");
    let pb2 = pb.clone();
    sequence
        .save_gif_with_progress(&output, delay_ms, move |current, _total| pb2.set_position(current))
        .context("GIF encoding failed")?;

    pb.finish_with_message("GIF saved.");
    Ok(())
}

// ── Step manifest ─────────────────────────────────────────────────────────────

/// JSON description of one step. Image paths are relative to the manifest.
#[derive(Deserialize)]
struct StepManifest {
    rgb: Option<PathBuf>,
    panoramic_rgb: Option<PathBuf>,
    objects: Option<Detections>,
    #[serde(default)]
    target_goal: Vec<PathBuf>,
    target_loc_objects: Option<Detections>,
    target_object: Option<Detections>,
    #[serde(default)]
    collision: bool,
    top_down_map: Option<MapManifest>,
    #[serde(default)]
    total_success: Vec<f32>,
    attention: Option<Attention>,
    bounds: Option<WorldBounds>,
}

/// Map entry; no `path` means a blank map.
#[derive(Deserialize)]
struct MapManifest {
    path: Option<PathBuf>,
    #[serde(default)]
    node_list: Vec<Vector3<f32>>,
    #[serde(default)]
    object_node_list: Vec<Vector3<f32>>,
}

impl StepManifest {
    fn load(&self, base: &Path) -> Result<(Observation, StepInfo)> {
        let open = |p: &PathBuf| open_rgb(&base.join(p));
        let observation = Observation {
            rgb: self.rgb.as_ref().map(open).transpose()?,
            panoramic_rgb: self.panoramic_rgb.as_ref().map(open).transpose()?,
            objects: self.objects.clone(),
            target_goal: self
                .target_goal
                .iter()
                .map(|p| {
                    let path = base.join(p);
                    image::open(&path)
                        .map(|img| img.to_rgb32f())
                        .with_context(|| format!("failed to open goal image {}", path.display()))
                })
                .collect::<Result<_>>()?,
            target_loc_objects: self.target_loc_objects.clone(),
            target_object: self.target_object.clone(),
        };

        let top_down_map = match &self.top_down_map {
            None => None,
            Some(MapManifest { path: None, .. }) => Some(TopDownMapSlot::Blank),
            Some(MapManifest {
                path: Some(path),
                node_list,
                object_node_list,
            }) => Some(TopDownMapSlot::Map(TopDownMap {
                map: open(path)?,
                node_list: node_list.clone(),
                object_node_list: object_node_list.clone(),
            })),
        };
        let info = StepInfo {
            collisions: Some(Collisions {
                is_collision: self.collision,
            }),
            top_down_map,
            total_success: self.total_success.clone(),
        };
        Ok((observation, info))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn open_rgb(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgb8())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len} [{elapsed_precise}]")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
