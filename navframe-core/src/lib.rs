pub mod agent;
pub mod annotation;
pub mod compose;
pub mod config;
pub mod map;
pub mod palette;
pub mod rendering;
pub mod sequence;
pub mod text;

// Re-export the error type so callers only need `navframe_core::Error`
pub use anyhow::Error;
pub use anyhow::Result;

pub use agent::draw_agent;
pub use annotation::{draw_bbox, BBox, BoxStyle, Detections};
pub use compose::{observations_to_image, Composer, Observation, StepInfo};
pub use map::{clip_map_birdseye_view, GridPoint};
pub use rendering::{concat_horizontal, concat_vertical, draw_collision, subplot2, FrameRenderer};
pub use text::append_text_to_image;
