use std::collections::HashMap;

use image::{Rgb, Rgb32FImage, RgbImage};
use nalgebra::Vector3;
use navframe_core::compose::{Attention, Collisions, TopDownMap, TopDownMapSlot};
use navframe_core::config::{ComposeOptions, TaskKind, ViewMode};
use navframe_core::map::{GridMapper, WorldBounds};
use navframe_core::palette::{CategoryTable, LabelTables, MarkerKind};
use navframe_core::text::put_text;
use navframe_core::{draw_bbox, observations_to_image, BBox, BoxStyle, Composer, Detections, Observation, StepInfo};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

fn single_options() -> ComposeOptions {
    ComposeOptions {
        mode: ViewMode::Single,
        ..ComposeOptions::default()
    }
}

fn compose(observation: &Observation, info: &StepInfo, options: &ComposeOptions) -> Option<RgbImage> {
    observations_to_image(observation, info, options, &LabelTables::default(), None).unwrap()
}

// --- empty steps ---

#[test]
fn test_nothing_to_show_is_none() {
    let out = compose(&Observation::default(), &StepInfo::default(), &ComposeOptions::default());
    assert!(out.is_none());
}

#[test]
fn test_blank_map_alone_uses_default_size() {
    let info = StepInfo {
        top_down_map: Some(TopDownMapSlot::Blank),
        ..StepInfo::default()
    };
    let out = compose(&Observation::default(), &info, &ComposeOptions::default()).unwrap();
    assert_eq!(out.dimensions(), (512, 512));
    assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
}

// --- egocentric views ---

#[test]
fn test_single_view_is_scaled() {
    let observation = Observation {
        rgb: Some(RgbImage::new(40, 30)),
        ..Observation::default()
    };
    let out = compose(&observation, &StepInfo::default(), &single_options()).unwrap();
    assert_eq!(out.dimensions(), (60, 60));
}

#[test]
fn test_blank_map_matches_frame_height() {
    let observation = Observation {
        rgb: Some(RgbImage::new(40, 30)),
        ..Observation::default()
    };
    let info = StepInfo {
        top_down_map: Some(TopDownMapSlot::Blank),
        ..StepInfo::default()
    };
    let out = compose(&observation, &info, &single_options()).unwrap();
    assert_eq!(out.dimensions(), (120, 60));
}

#[test]
fn test_panoramic_goal_and_map_layout() {
    let observation = Observation {
        panoramic_rgb: Some(RgbImage::new(40, 30)),
        target_goal: vec![Rgb32FImage::from_pixel(40, 30, Rgb([0.5, 0.5, 0.5]))],
        ..Observation::default()
    };
    let info = StepInfo {
        top_down_map: Some(TopDownMapSlot::Map(TopDownMap {
            map: RgbImage::from_pixel(50, 50, Rgb([200, 200, 200])),
            ..TopDownMap::default()
        })),
        ..StepInfo::default()
    };
    let out = compose(&observation, &info, &ComposeOptions::default()).unwrap();
    // 40x60 stacked views scaled to 60x120, then a 120x120 map
    assert_eq!(out.dimensions(), (60 + 120, 120));
    let map_px = out.get_pixel(120, 60);
    assert!(map_px.0.iter().all(|&v| v.abs_diff(200) <= 1));
}

#[test]
fn test_collision_tints_border() {
    let observation = Observation {
        rgb: Some(RgbImage::new(40, 30)),
        ..Observation::default()
    };
    let info = StepInfo {
        collisions: Some(Collisions { is_collision: true }),
        ..StepInfo::default()
    };
    let out = compose(&observation, &info, &single_options()).unwrap();
    let corner = out.get_pixel(0, 0);
    assert!(corner[0] > 0);
    assert_eq!(corner[1], 0);
}

// --- localization ---

#[test]
fn test_map_only_step_gets_goal_marker() {
    let bounds = WorldBounds {
        lower: Vector3::new(0.0, 0.0, 0.0),
        upper: Vector3::new(4.0, 1.0, 4.0),
    };
    let mapper: &dyn GridMapper = &bounds;
    let info = StepInfo {
        top_down_map: Some(TopDownMapSlot::Map(TopDownMap {
            map: RgbImage::from_pixel(256, 256, Rgb([255, 255, 255])),
            node_list: vec![Vector3::new(0.5, 0.0, 0.5), Vector3::new(2.0, 0.0, 1.0)],
            object_node_list: Vec::new(),
        })),
        ..StepInfo::default()
    };
    let attention = Attention {
        goal: vec![0.1, 0.9],
        ..Attention::default()
    };

    let mut composer = Composer::new(ComposeOptions::default(), LabelTables::default());
    let out = composer
        .compose(&Observation::default(), &info, Some((&attention, mapper)))
        .unwrap()
        .unwrap();

    assert_eq!(out.dimensions(), (256, 256));
    assert_eq!(out.get_pixel(126, 64), &MarkerKind::GoalNode.color());
    // no current-node scores, so no marker at node 0
    assert_eq!(out.get_pixel(29, 32), &Rgb([255, 255, 255]));
}

// --- goal and object annotations ---

fn gibson_tables() -> (LabelTables, CategoryTable) {
    let table = CategoryTable::from_names(["chair", "table", "sofa"]);
    let tables = LabelTables {
        datasets: HashMap::from([("gibson".to_string(), table.clone())]),
        detection: CategoryTable::default(),
    };
    (tables, table)
}

/// Single view at native size, so frames compare pixel for pixel.
fn unscaled(options: ComposeOptions) -> ComposeOptions {
    ComposeOptions {
        mode: ViewMode::Single,
        egocentric_scale: (1.0, 1.0),
        ..options
    }
}

fn goal_only(observation: Observation) -> Observation {
    Observation {
        target_goal: vec![Rgb32FImage::new(160, 60)],
        ..observation
    }
}

fn run(observation: &Observation, options: &ComposeOptions) -> navframe_core::Result<Option<RgbImage>> {
    let (tables, _) = gibson_tables();
    observations_to_image(observation, &StepInfo::default(), options, &tables, None)
}

#[test]
fn test_multi_target_caption_skips_padding_rows() {
    let (_, table) = gibson_tables();
    let chair = BBox::new(20.0, 15.0, 60.0, 45.0);
    let sofa = BBox::new(90.0, 20.0, 140.0, 50.0);
    let observation = goal_only(Observation {
        target_loc_objects: Some(Detections {
            boxes: vec![chair, BBox::new(0.0, 0.0, 0.0, 0.0), sofa],
            categories: vec![0, 0, 2],
            scores: Vec::new(),
        }),
        ..Observation::default()
    });
    let options = unscaled(ComposeOptions {
        multi_target: true,
        ..ComposeOptions::default()
    });
    let out = run(&observation, &options).unwrap().unwrap();

    let style = BoxStyle::categorical();
    let mut expected = RgbImage::new(160, 60);
    draw_bbox(&mut expected, &[chair], &[0], Some(&table), &style).unwrap();
    draw_bbox(&mut expected, &[sofa], &[2], Some(&table), &style).unwrap();
    put_text(&mut expected, "target obs: chair, sofa", (5, 10), 0.4, WHITE);
    assert_eq!(out, expected);
    assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
}

#[test]
fn test_object_target_caption_names_the_target() {
    let (_, table) = gibson_tables();
    let target = BBox::new(20.0, 15.0, 60.0, 45.0);
    let observation = goal_only(Observation {
        target_object: Some(Detections {
            boxes: vec![target],
            categories: vec![1],
            scores: Vec::new(),
        }),
        ..Observation::default()
    });
    let style = BoxStyle::categorical();

    let options = unscaled(ComposeOptions {
        task: TaskKind::ObjTarget,
        ..ComposeOptions::default()
    });
    let out = run(&observation, &options).unwrap().unwrap();
    let mut expected = RgbImage::new(160, 60);
    draw_bbox(&mut expected, &[target], &[1], Some(&table), &style).unwrap();
    put_text(&mut expected, "target_obs: table", (5, 10), 0.4, WHITE);
    assert_eq!(out, expected);

    // image-goal episodes keep the boxes under the plain caption
    let out = run(&observation, &unscaled(ComposeOptions::default())).unwrap().unwrap();
    let mut expected = RgbImage::new(160, 60);
    draw_bbox(&mut expected, &[target], &[1], Some(&table), &style).unwrap();
    put_text(&mut expected, "target_obs", (5, 10), 0.4, WHITE);
    assert_eq!(out, expected);
}

#[test]
fn test_objects_below_threshold_are_not_drawn() {
    let (_, table) = gibson_tables();
    let confident = BBox::new(20.0, 15.0, 60.0, 45.0);
    let doubtful = BBox::new(90.0, 15.0, 150.0, 45.0);
    let observation = Observation {
        rgb: Some(RgbImage::new(160, 60)),
        objects: Some(Detections {
            boxes: vec![confident, doubtful],
            categories: vec![0, 1],
            scores: vec![0.9, 0.1],
        }),
        ..Observation::default()
    };

    let out = run(&observation, &unscaled(ComposeOptions::default())).unwrap().unwrap();
    let mut expected = RgbImage::new(160, 60);
    draw_bbox(&mut expected, &[confident], &[0], Some(&table), &BoxStyle::categorical()).unwrap();
    put_text(&mut expected, "current obs", (5, 10), 0.4, WHITE);
    assert_eq!(out, expected);
    assert_eq!(out.get_pixel(90, 30), &Rgb([0, 0, 0]));

    let hidden = unscaled(ComposeOptions {
        draw_object: false,
        ..ComposeOptions::default()
    });
    let out = run(&observation, &hidden).unwrap().unwrap();
    let mut expected = RgbImage::new(160, 60);
    put_text(&mut expected, "current obs", (5, 10), 0.4, WHITE);
    assert_eq!(out, expected);
}

#[test]
fn test_unknown_object_category_is_an_error() {
    let observation = Observation {
        rgb: Some(RgbImage::new(160, 60)),
        objects: Some(Detections {
            boxes: vec![BBox::new(20.0, 15.0, 60.0, 45.0)],
            categories: vec![99],
            scores: vec![0.9],
        }),
        ..Observation::default()
    };
    assert!(run(&observation, &unscaled(ComposeOptions::default())).is_err());
}
