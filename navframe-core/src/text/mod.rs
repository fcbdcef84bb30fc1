//! text — bitmap glyph rendering and the caption band appended under frames.
//!
//! Glyphs come from the 8×8 `font8x8` tables, nearest-scaled to a square cell
//! whose side follows the requested font scale. A scale of 0.5 gives an 8 px
//! cell, which is close to the advance of the usual vector debug fonts at the
//! same scale, so layout constants (line gaps, margins) carry over.

use font8x8::{UnicodeFonts, BASIC_FONTS, LATIN_FONTS};
use image::{Rgb, RgbImage};
use tracing::debug;

/// Gap between caption lines, and below the last one.
const LINE_GAP: u32 = 10;
/// Left margin of caption lines.
const LEFT_MARGIN: i32 = 10;

/// Cell geometry for one font scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphMetrics {
    /// Horizontal advance per character, in pixels.
    pub advance: u32,
    /// Glyph height above the baseline, in pixels.
    pub height: u32,
}

impl GlyphMetrics {
    pub fn for_scale(font_size: f32) -> Self {
        let cell = ((16.0 * font_size).round() as i64).max(1) as u32;
        Self {
            advance: cell,
            height: cell,
        }
    }
}

/// Zero-width characters (combining marks, controls) take no cell.
fn takes_cell(ch: char) -> bool {
    let mut buf = [0u8; 4];
    textwrap::core::display_width(ch.encode_utf8(&mut buf)) > 0
}

/// Number of glyph cells `text` occupies on one line.
pub fn cell_count(text: &str) -> usize {
    text.chars().filter(|&ch| takes_cell(ch)).count()
}

/// Pixel extent `(width, height)` of a single line of text.
pub fn text_size(text: &str, font_size: f32) -> (u32, u32) {
    let m = GlyphMetrics::for_scale(font_size);
    (cell_count(text) as u32 * m.advance, m.height)
}

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .unwrap_or([0; 8])
}

/// Draw `text` with its baseline-left corner at `origin`. Pixels falling
/// outside the image are dropped.
pub fn put_text(image: &mut RgbImage, text: &str, origin: (i32, i32), font_size: f32, color: Rgb<u8>) {
    let m = GlyphMetrics::for_scale(font_size);
    let (w, h) = (image.width() as i64, image.height() as i64);
    let cell = m.advance as i64;
    let top = origin.1 as i64 - m.height as i64 + 1;

    for (i, ch) in text.chars().filter(|&ch| takes_cell(ch)).enumerate() {
        let bitmap = glyph(ch);
        let left = origin.0 as i64 + i as i64 * cell;
        if left >= w {
            break;
        }
        if left + cell <= 0 {
            continue;
        }
        for py in 0..m.height as i64 {
            let y = top + py;
            if y < 0 || y >= h {
                continue;
            }
            let row = bitmap[(py * 8 / m.height as i64) as usize];
            if row == 0 {
                continue;
            }
            for px in 0..cell {
                let x = left + px;
                if x < 0 || x >= w {
                    continue;
                }
                if row >> (px * 8 / cell) & 1 == 1 {
                    image.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
}

/// Greedy word wrap to at most `width` glyph cells per line. Words longer
/// than a line are broken. Blank input, or a zero width, produces no lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 || text.trim().is_empty() {
        return Vec::new();
    }
    textwrap::wrap(text, width)
        .into_iter()
        .flat_map(|line| split_cells(&line, width))
        .collect()
}

/// Break `line` so no piece exceeds `width` cells. `textwrap` measures
/// terminal display width, which can undercount what `put_text` lays out.
fn split_cells(line: &str, width: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for ch in line.chars() {
        let cells = usize::from(takes_cell(ch));
        if used > 0 && used + cells > width {
            pieces.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(ch);
        used += cells;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Append `text` underneath `image` as white-on-black wrapped lines.
///
/// Lines are wrapped to the number of glyph advances that fit the image
/// width. The band grows with the line count; nothing is truncated, so the
/// result can be much taller than the input. An image narrower than one
/// advance gets the empty padding band only.
pub fn append_text_to_image(image: &RgbImage, text: &str, font_size: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let metrics = GlyphMetrics::for_scale(font_size);
    let wrap_width = (w / metrics.advance) as usize;
    let lines = wrap_text(text, wrap_width);

    let mut baselines = Vec::with_capacity(lines.len());
    let mut y = 0u32;
    for _ in &lines {
        y += metrics.height + LINE_GAP;
        if y % 2 == 1 {
            y += 1;
        }
        baselines.push(y);
    }
    let band = y + LINE_GAP;
    debug!(lines = lines.len(), band, wrap_width, "appending caption band");

    let mut out = RgbImage::new(w, h + band);
    image::imageops::overlay(&mut out, image, 0, 0);
    for (line, baseline) in lines.iter().zip(baselines) {
        put_text(
            &mut out,
            line,
            (LEFT_MARGIN, (h + baseline) as i32),
            font_size,
            Rgb([255, 255, 255]),
        );
    }
    out
}
