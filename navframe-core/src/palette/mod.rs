//! palette — category label tables and the fixed colour tables used by the
//! overlays.
//!
//! Category tables are plain data owned by the caller (loaded from JSON or
//! built in code); nothing here mutates them.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};

/// Instance colour table (RGB), indexed by category / instance id.
pub const COLORS_RGB: [[u8; 3]; 100] = [
    [100, 100, 5], [0, 0, 255], [0, 255, 0], [0, 255, 239], [246, 0, 0],
    [255, 0, 235], [255, 255, 0], [255, 254, 255], [22, 198, 1], [4, 112, 255],
    [150, 0, 126], [0, 255, 155], [255, 147, 0], [255, 148, 255], [0, 0, 123],
    [0, 110, 125], [0, 244, 67], [175, 0, 0], [81, 0, 255], [120, 51, 0],
    [10, 16, 189], [135, 255, 0], [153, 204, 255], [255, 2, 128], [203, 0, 73],
    [247, 255, 171], [178, 3, 255], [69, 239, 31], [0, 100, 0], [34, 54, 255],
    [66, 253, 198], [77, 8, 144], [255, 88, 13], [255, 58, 255], [225, 201, 252],
    [80, 0, 0], [44, 0, 64], [0, 184, 66], [55, 144, 0], [0, 77, 198],
    [127, 12, 56], [128, 47, 255], [186, 157, 0], [57, 215, 255], [115, 255, 255],
    [62, 255, 110], [202, 0, 181], [255, 129, 159], [196, 254, 43], [187, 255, 238],
    [255, 249, 87], [190, 255, 122], [129, 6, 198], [255, 201, 36], [40, 50, 19],
    [28, 55, 138], [0, 69, 75], [0, 174, 134], [0, 172, 255], [103, 191, 0],
    [0, 208, 197], [77, 52, 82], [116, 152, 255], [151, 105, 0], [77, 50, 195],
    [85, 97, 34], [0, 136, 187], [196, 57, 0], [255, 39, 62], [202, 44, 127],
    [255, 186, 181], [130, 255, 76], [186, 154, 232], [78, 197, 82], [161, 64, 68],
    [140, 255, 179], [243, 149, 82], [194, 215, 180], [20, 126, 60], [65, 104, 167],
    [65, 207, 152], [162, 202, 44], [61, 170, 209], [132, 56, 144], [181, 55, 202],
    [115, 103, 101], [82, 100, 238], [144, 207, 118], [240, 91, 98], [220, 103, 220],
    [156, 102, 255], [255, 66, 171], [215, 201, 104], [132, 184, 187], [115, 150, 53],
    [96, 155, 132], [180, 123, 68], [192, 158, 153], [181, 100, 141], [133, 125, 189],
];

/// Colour for an instance id, wrapping around the table.
pub fn instance_color(id: usize) -> Rgb<u8> {
    Rgb(COLORS_RGB[id % COLORS_RGB.len()])
}

/// Localization marker drawn on the top-down map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    CurrentNode,
    GoalNode,
    CurrentObject,
    GoalObject,
}

impl MarkerKind {
    /// Row of `COLORS_RGB` used for this marker.
    pub fn color_index(self) -> usize {
        match self {
            MarkerKind::CurrentNode => 18,
            MarkerKind::GoalNode => 6,
            MarkerKind::CurrentObject => 29,
            MarkerKind::GoalObject => 8,
        }
    }

    pub fn color(self) -> Rgb<u8> {
        instance_color(self.color_index())
    }
}

/// One entry of a category table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub color: [u8; 3],
}

/// Category id -> (name, colour). Ids are positions in `entries`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryTable {
    pub entries: Vec<Category>,
}

impl CategoryTable {
    /// Build a table from names, colouring entry `i` with `COLORS_RGB[i]`.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Category {
                name: name.into(),
                color: instance_color(i).0,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: usize) -> Result<&Category> {
        self.entries
            .get(id)
            .ok_or_else(|| anyhow!("category id {id} out of range (table has {})", self.len()))
    }

    pub fn label(&self, id: usize) -> Result<&str> {
        Ok(self.get(id)?.name.as_str())
    }

    pub fn color(&self, id: usize) -> Result<Rgb<u8>> {
        Ok(Rgb(self.get(id)?.color))
    }
}

/// Per-dataset category tables plus the detector's own label set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelTables {
    #[serde(default)]
    pub datasets: HashMap<String, CategoryTable>,
    #[serde(default)]
    pub detection: CategoryTable,
}

impl LabelTables {
    /// Table used for labelling: the detector's when `use_detector`, else the
    /// dataset's.
    pub fn select(&self, dataset_name: &str, use_detector: bool) -> Result<&CategoryTable> {
        if use_detector {
            return Ok(&self.detection);
        }
        self.datasets
            .get(dataset_name)
            .ok_or_else(|| anyhow!("no category table for dataset {dataset_name:?}"))
    }
}
