use image::{Rgb, RgbImage};
use navframe_core::rendering::{hstack, resize, vstack, Resampling, COLLISION_ALPHA};
use navframe_core::{concat_horizontal, concat_vertical, draw_collision, subplot2, FrameRenderer};

// --- draw_collision ---

#[test]
fn test_collision_opaque_ring() {
    let mut view = RgbImage::new(100, 100);
    draw_collision(&mut view, 1.0);

    let red = Rgb([255, 0, 0]);
    let black = Rgb([0, 0, 0]);
    assert_eq!(view.get_pixel(0, 0), &red);
    assert_eq!(view.get_pixel(4, 50), &red);
    assert_eq!(view.get_pixel(50, 4), &red);
    assert_eq!(view.get_pixel(95, 50), &red);
    assert_eq!(view.get_pixel(50, 99), &red);
    assert_eq!(view.get_pixel(5, 50), &black);
    assert_eq!(view.get_pixel(94, 50), &black);
    assert_eq!(view.get_pixel(50, 50), &black);
}

#[test]
fn test_collision_blends_translucently() {
    let mut view = RgbImage::from_pixel(40, 40, Rgb([100, 100, 100]));
    draw_collision(&mut view, COLLISION_ALPHA);
    let px = view.get_pixel(0, 0);
    assert!(px[0] > 100);
    assert!(px[1] < 100);
    assert_eq!(view.get_pixel(20, 20), &Rgb([100, 100, 100]));
}

// --- concat ---

#[test]
fn test_concat_horizontal_matches_taller_height() {
    let a = RgbImage::new(10, 20);
    let b = RgbImage::new(5, 10);
    let out = concat_horizontal(&a, &b).unwrap();
    assert_eq!(out.height(), 20);
    assert_eq!(out.width(), 20);
}

#[test]
fn test_concat_vertical_matches_wider_width() {
    let a = RgbImage::new(8, 8);
    let b = RgbImage::new(16, 4);
    let out = concat_vertical(&a, &b).unwrap();
    assert_eq!(out.width(), 16);
    assert_eq!(out.height(), 16 + 4);
}

#[test]
fn test_concat_keeps_left_pixels() {
    let a = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
    let b = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
    let out = concat_horizontal(&a, &b).unwrap();
    assert_eq!(out.get_pixel(0, 0), &Rgb([1, 2, 3]));
    assert_eq!(out.get_pixel(7, 3), &Rgb([9, 9, 9]));
}

// --- stacking ---

#[test]
fn test_hstack_rejects_height_mismatch() {
    let a = RgbImage::new(4, 4);
    let b = RgbImage::new(4, 5);
    assert!(hstack(&[a.clone(), b.clone()]).is_err());
    assert!(vstack(&[a, RgbImage::new(5, 4)]).is_err());
}

// --- subplot2 ---

#[test]
fn test_subplot_grid_size_and_blank_cells() {
    let images = vec![RgbImage::new(30, 20); 3];
    let out = subplot2(&images, (2, 2), (20, 30), (0.1, 0.1), false).unwrap();
    assert_eq!(out.dimensions(), (2 * 30 + 3, 2 * 20 + 2));
    // gap and the unused fourth cell stay white
    assert_eq!(out.get_pixel(31, 5), &Rgb([255, 255, 255]));
    assert_eq!(out.get_pixel(50, 30), &Rgb([255, 255, 255]));
    assert_eq!(out.get_pixel(5, 5), &Rgb([0, 0, 0]));
}

#[test]
fn test_subplot_transpose_fills_columns_first() {
    let images = vec![RgbImage::new(10, 10), RgbImage::from_pixel(10, 10, Rgb([7, 7, 7]))];
    let out = subplot2(&images, (2, 2), (10, 10), (0.0, 0.0), true).unwrap();
    // second image goes below the first
    assert_eq!(out.get_pixel(5, 15), &Rgb([7, 7, 7]));
    assert_eq!(out.get_pixel(15, 5), &Rgb([255, 255, 255]));
}

#[test]
fn test_subplot_rejects_overflow() {
    let images = vec![RgbImage::new(4, 4); 5];
    assert!(subplot2(&images, (2, 2), (4, 4), (0.0, 0.0), false).is_err());
}

// --- resize ---

#[test]
fn test_resize_and_scale() {
    let image = RgbImage::from_pixel(40, 30, Rgb([50, 60, 70]));
    let out = resize(&image, 20, 15, Resampling::Nearest).unwrap();
    assert_eq!(out.dimensions(), (20, 15));
    assert_eq!(out.get_pixel(10, 7), &Rgb([50, 60, 70]));

    let mut renderer = FrameRenderer::new();
    let scaled = renderer.scale_by(&image, 1.5, 2.0, Resampling::Bilinear).unwrap();
    assert_eq!(scaled.dimensions(), (60, 60));
}
