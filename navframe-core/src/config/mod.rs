//! config — composition options and label-table loading.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::palette::LabelTables;

/// Score a detection needs before it is drawn on the egocentric view.
pub const DEFAULT_OBJECT_SCORE_THRESHOLD: f32 = 0.3;

/// Which observation is the egocentric view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// `panoramic_rgb`; views stack vertically.
    #[default]
    Panoramic,
    /// `rgb`; views sit side by side.
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    ImageGoal,
    /// Object-target task: the goal view is captioned with the target label.
    ObjTarget,
}

/// Knobs of [`crate::compose::observations_to_image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeOptions {
    pub mode: ViewMode,
    pub task: TaskKind,
    /// Label detections with the detector's table instead of the dataset's.
    pub use_detector: bool,
    pub dataset_name: String,
    /// Goal view carries several targets (`target_loc_objects`).
    pub multi_target: bool,
    /// Draw detected objects on the egocentric view.
    pub draw_object: bool,
    pub object_score_threshold: f32,
    /// Egocentric view scale `(fx, fy)` applied before the map is attached.
    pub egocentric_scale: (f32, f32),
    /// Height of the blank map square when there is no egocentric frame.
    pub blank_map_size: u32,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            mode: ViewMode::Panoramic,
            task: TaskKind::ImageGoal,
            use_detector: false,
            dataset_name: "gibson".to_string(),
            multi_target: false,
            draw_object: true,
            object_score_threshold: DEFAULT_OBJECT_SCORE_THRESHOLD,
            egocentric_scale: (1.5, 2.0),
            blank_map_size: 512,
        }
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {what} file {}", path.display()))
}

/// Read [`ComposeOptions`] from JSON; omitted fields keep their defaults.
pub fn load_options<P: AsRef<Path>>(path: P) -> Result<ComposeOptions> {
    let options: ComposeOptions = load_json(path.as_ref(), "options")?;
    info!(mode = ?options.mode, dataset = %options.dataset_name, "loaded compose options");
    Ok(options)
}

/// Read [`LabelTables`] from JSON.
pub fn load_label_tables<P: AsRef<Path>>(path: P) -> Result<LabelTables> {
    let tables: LabelTables = load_json(path.as_ref(), "label table")?;
    info!(
        datasets = tables.datasets.len(),
        detection = tables.detection.len(),
        "loaded label tables"
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_options_keep_defaults() {
        let o: ComposeOptions =
            serde_json::from_str(r#"{"mode": "single", "task": "obj_target"}"#).unwrap();
        assert_eq!(o.mode, ViewMode::Single);
        assert_eq!(o.task, TaskKind::ObjTarget);
        assert_eq!(o.dataset_name, "gibson");
        assert!(o.draw_object);
        assert_eq!(o.egocentric_scale, (1.5, 2.0));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_options("/nonexistent/options.json").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/options.json"));
    }
}
