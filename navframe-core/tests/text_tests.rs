use image::{Rgb, RgbImage};
use navframe_core::append_text_to_image;
use navframe_core::text::{text_size, wrap_text};

// --- append_text_to_image ---

#[test]
fn test_caption_keeps_width_and_grows_height() {
    let image = RgbImage::new(120, 80);
    let out = append_text_to_image(&image, "hello world this is a caption", 0.5);
    assert_eq!(out.width(), 120);
    assert!(out.height() > 80);
}

#[test]
fn test_empty_caption_adds_padding_only() {
    let image = RgbImage::new(200, 200);
    let out = append_text_to_image(&image, "", 0.5);
    assert_eq!(out.dimensions(), (200, 210));
}

#[test]
fn test_caption_preserves_source_pixels() {
    let image = RgbImage::from_pixel(64, 48, Rgb([10, 20, 30]));
    let out = append_text_to_image(&image, "step 12", 0.5);
    for y in 0..48 {
        for x in 0..64 {
            assert_eq!(out.get_pixel(x, y), &Rgb([10, 20, 30]));
        }
    }
}

#[test]
fn test_caption_text_is_white_in_band() {
    let image = RgbImage::new(200, 200);
    let out = append_text_to_image(&image, "X", 0.5);
    let white = (0..out.width())
        .flat_map(|x| (200..out.height()).map(move |y| (x, y)))
        .filter(|&(x, y)| out.get_pixel(x, y) == &Rgb([255, 255, 255]))
        .count();
    assert!(white > 0, "caption should draw white glyph pixels");
}

#[test]
fn test_longer_caption_gets_taller_band() {
    let image = RgbImage::new(100, 50);
    let short = append_text_to_image(&image, "hi", 0.5);
    let long = append_text_to_image(
        &image,
        "one two three four five six seven eight nine ten eleven twelve",
        0.5,
    );
    assert!(long.height() > short.height());
    assert_eq!(long.width(), short.width());
}

// --- wrapping and measuring ---

#[test]
fn test_wrap_whitespace_only_is_empty() {
    assert!(wrap_text("   ", 10).is_empty());
    assert!(wrap_text("", 10).is_empty());
}

#[test]
fn test_wrap_respects_width() {
    let lines = wrap_text("aaa bbb ccc ddd", 7);
    assert!(lines.len() >= 2);
    assert!(lines.iter().all(|l| l.chars().count() <= 7));
}

#[test]
fn test_text_size_scales_with_font() {
    let (small_w, small_h) = text_size("abc", 0.5);
    let (big_w, big_h) = text_size("abc", 1.0);
    assert!(big_w > small_w);
    assert!(big_h > small_h);
}

#[test]
fn test_wrapped_lines_fit_image_pixels() {
    let width = 80;
    let advance = 8; // font 0.5
    let text = format!("{} {}", "e\u{301}".repeat(10), "a\u{308}o\u{302} ".repeat(12));
    let lines = wrap_text(&text, (width / advance) as usize);
    assert!(!lines.is_empty());
    for line in &lines {
        assert!(text_size(line, 0.5).0 <= width, "{line:?} wider than {width}px");
    }
}
