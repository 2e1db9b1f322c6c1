use std::path::Path;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use plotly::common::{ColorScale, ColorScalePalette};
use plotly::layout::{Axis, Layout};
use plotly::{HeatMap, Plot};

use crate::error::{PipelineError, Result};
use crate::metrics::ConfusionMatrix;

const CELL: u32 = 48;
const MARGIN: u32 = 8;
const PAD: u32 = 6;
const GAP: u32 = 12;
const BAR_WIDTH: u32 = 16;
/// Side of one font glyph before scaling.
const GLYPH: u32 = 8;
const TEXT_SCALE: u32 = 2;
const LINE: u32 = GLYPH * TEXT_SCALE;
const GRID: Rgb<u8> = Rgb([32, 32, 32]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

pub const X_AXIS_TITLE: &str = "Predicted label";
pub const Y_AXIS_TITLE: &str = "True label";

/// Viridis anchor colours, evenly spaced over [0, 1].
const VIRIDIS: [[f64; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

/// Map `t` in [0, 1] onto the viridis ramp.
fn colormap(t: f64) -> Rgb<u8> {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let lo = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lo as f64;
    let mut rgb = [0u8; 3];
    for (c, out) in rgb.iter_mut().enumerate() {
        let v = VIRIDIS[lo][c] + (VIRIDIS[lo + 1][c] - VIRIDIS[lo][c]) * frac;
        *out = v.round() as u8;
    }
    Rgb(rgb)
}

fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, colour: Rgb<u8>) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, colour);
        }
    }
}

/// Bitmap for `ch`; characters outside the basic Latin set draw as `?`.
fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH * scale
}

/// Draw `text` left to right with its top-left corner at `(x, y)`.
fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, colour: Rgb<u8>) {
    for (n, ch) in text.chars().enumerate() {
        let x0 = x + n as u32 * GLYPH * scale;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1 << col) != 0 {
                    fill_rect(img, x0 + col * scale, y + row as u32 * scale, scale, scale, colour);
                }
            }
        }
    }
}

/// Draw `text` rotated a quarter turn counter-clockwise so it reads bottom to
/// top, starting at the bottom-left corner `(x, bottom)`.
fn draw_text_vertical(img: &mut RgbImage, x: u32, bottom: u32, text: &str, scale: u32, colour: Rgb<u8>) {
    for (n, ch) in text.chars().enumerate() {
        let offset = n as u32 * GLYPH;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1 << col) != 0 {
                    let y = bottom.saturating_sub((offset + col + 1) * scale);
                    fill_rect(img, x + row as u32 * scale, y, scale, scale, colour);
                }
            }
        }
    }
}

/// Vertical colour bar, maximum at the top.
fn draw_colour_bar(img: &mut RgbImage, x0: u32, y0: u32, height: u32) {
    for dy in 0..height {
        let t = 1.0 - dy as f64 / (height.max(2) - 1) as f64;
        fill_rect(img, x0, y0 + dy, BAR_WIDTH, 1, colormap(t));
    }
}

/// Pixel placement of a confusion-matrix render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfusionGeometry {
    grid_x: u32,
    grid_y: u32,
    grid: u32,
    width: u32,
    height: u32,
}

impl ConfusionGeometry {
    fn new(cm: &ConfusionMatrix, title: &str) -> Self {
        let grid = cm.n_classes() as u32 * CELL;
        let widest_tick = cm
            .labels
            .iter()
            .map(|l| text_width(&l.to_string(), TEXT_SCALE))
            .max()
            .unwrap_or(0);

        let grid_x = MARGIN + LINE + PAD + widest_tick + PAD;
        let grid_y = MARGIN + LINE + PAD;
        let below = PAD + LINE + PAD + LINE;
        let width = (grid_x + grid + GAP + BAR_WIDTH + MARGIN)
            .max(2 * MARGIN + text_width(title, TEXT_SCALE))
            .max(grid_x + text_width(X_AXIS_TITLE, TEXT_SCALE) + MARGIN);
        let height = grid_y + (grid + below).max(text_width(Y_AXIS_TITLE, TEXT_SCALE)) + MARGIN;

        ConfusionGeometry {
            grid_x,
            grid_y,
            grid,
            width,
            height,
        }
    }
}

/// Colour-scaled confusion matrix with a title, axis titles, class ticks, the
/// count in every cell and a colour bar. Rows are true labels top to bottom,
/// columns predicted labels left to right.
pub fn render_confusion_png(cm: &ConfusionMatrix, title: &str, path: &Path) -> Result<()> {
    if cm.n_classes() == 0 {
        return Err(PipelineError::Render("confusion matrix has no classes".to_string()));
    }
    let geo = ConfusionGeometry::new(cm, title);
    let mut img = RgbImage::from_pixel(geo.width, geo.height, BACKGROUND);

    let title_x = (geo.width.saturating_sub(text_width(title, TEXT_SCALE))) / 2;
    draw_text(&mut img, title_x, MARGIN, title, TEXT_SCALE, INK);

    let max = cm.counts.iter().copied().max().unwrap_or(0).max(1) as f64;
    for ((i, j), &count) in cm.counts.indexed_iter() {
        let x0 = geo.grid_x + j as u32 * CELL;
        let y0 = geo.grid_y + i as u32 * CELL;
        let t = count as f64 / max;
        fill_rect(&mut img, x0, y0, CELL, CELL, GRID);
        fill_rect(&mut img, x0 + 1, y0 + 1, CELL - 2, CELL - 2, colormap(t));

        let text = count.to_string();
        let scale = if text_width(&text, TEXT_SCALE) + 4 <= CELL { TEXT_SCALE } else { 1 };
        let ink = if t > 0.5 { INK } else { BACKGROUND };
        draw_text(
            &mut img,
            x0 + CELL.saturating_sub(text_width(&text, scale)) / 2,
            y0 + (CELL - GLYPH * scale) / 2,
            &text,
            scale,
            ink,
        );
    }

    for (n, label) in cm.labels.iter().enumerate() {
        let tick = label.to_string();
        let w = text_width(&tick, TEXT_SCALE);
        let offset = n as u32 * CELL + (CELL.saturating_sub(w)) / 2;
        draw_text(&mut img, geo.grid_x + offset, geo.grid_y + geo.grid + PAD, &tick, TEXT_SCALE, INK);
        draw_text(
            &mut img,
            geo.grid_x - PAD - w,
            geo.grid_y + n as u32 * CELL + (CELL - LINE) / 2,
            &tick,
            TEXT_SCALE,
            INK,
        );
    }

    let x_title = geo.grid_x + geo.grid.saturating_sub(text_width(X_AXIS_TITLE, TEXT_SCALE)) / 2;
    draw_text(&mut img, x_title, geo.grid_y + geo.grid + 2 * PAD + LINE, X_AXIS_TITLE, TEXT_SCALE, INK);
    let y_len = text_width(Y_AXIS_TITLE, TEXT_SCALE);
    let y_bottom = geo.grid_y + geo.grid.max(y_len) - geo.grid.max(y_len).saturating_sub(y_len) / 2;
    draw_text_vertical(&mut img, MARGIN, y_bottom, Y_AXIS_TITLE, TEXT_SCALE, INK);

    draw_colour_bar(&mut img, geo.grid_x + geo.grid + GAP, geo.grid_y, geo.grid);

    img.save(path)?;
    Ok(())
}

/// Min-max scaled rendering of a single image, upscaled so the longer side
/// is at least 256 pixels, under one caption line per entry of `caption`.
pub fn render_sample_png(image: &Array2<f32>, caption: &[String], path: &Path) -> Result<()> {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return Err(PipelineError::Render(format!("cannot render image of shape {:?}", image.dim())));
    }
    let scale = (256 / rows.max(cols)).max(1) as u32;
    let (img_w, img_h) = (cols as u32 * scale, rows as u32 * scale);

    let widest_line = caption.iter().map(|l| text_width(l, TEXT_SCALE)).max().unwrap_or(0);
    let caption_h = caption.len() as u32 * (LINE + PAD);
    let width = 2 * MARGIN + img_w.max(widest_line);
    let height = 2 * MARGIN + caption_h + img_h;
    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

    for (n, line) in caption.iter().enumerate() {
        let x = (width.saturating_sub(text_width(line, TEXT_SCALE))) / 2;
        draw_text(&mut img, x, MARGIN + n as u32 * (LINE + PAD), line, TEXT_SCALE, INK);
    }

    let (lo, hi) = image
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = (hi - lo) as f64;

    let x0 = (width - img_w) / 2;
    let y0 = MARGIN + caption_h;
    for ((r, c), &v) in image.indexed_iter() {
        let t = if span > 0.0 { (v - lo) as f64 / span } else { 0.0 };
        fill_rect(&mut img, x0 + c as u32 * scale, y0 + r as u32 * scale, scale, scale, colormap(t));
    }

    img.save(path)?;
    Ok(())
}

/// Interactive heatmap of a confusion matrix.
pub fn plot_confusion_matrix(cm: &ConfusionMatrix, title: &str) -> Plot {
    let x: Vec<String> = cm.labels.iter().map(|l| l.to_string()).collect();
    // Plotly draws the first row at the bottom; reverse so true labels read
    // top to bottom.
    let y: Vec<String> = x.iter().rev().cloned().collect();
    let z: Vec<Vec<usize>> = cm.to_rows().into_iter().rev().collect();

    let trace = HeatMap::new(x, y, z).color_scale(ColorScale::Palette(ColorScalePalette::Viridis));

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title(X_AXIS_TITLE))
            .y_axis(Axis::new().title(Y_AXIS_TITLE)),
    );
    plot
}

/// Interactive heatmap of one test image.
pub fn plot_sample(image: &Array2<f32>, title: &str) -> Plot {
    // Same orientation as the PNG: the first image row on top.
    let z: Vec<Vec<f32>> = image.outer_iter().rev().map(|row| row.to_vec()).collect();
    let trace = HeatMap::new_z(z).color_scale(ColorScale::Palette(ColorScalePalette::Viridis));

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(Layout::new().title(title));
    plot
}

pub fn write_plot_html(plot: &Plot, path: &Path) -> Result<()> {
    std::fs::write(path, plot.to_html())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_ink(img: &RgbImage, x0: u32, y0: u32, w: u32, h: u32) -> bool {
        (y0..y0 + h).any(|y| (x0..x0 + w).any(|x| *img.get_pixel(x, y) == INK))
    }

    #[test]
    fn colormap_spans_the_ramp() {
        assert_eq!(colormap(0.0), Rgb([68, 1, 84]));
        assert_eq!(colormap(1.0), Rgb([253, 231, 37]));
        assert_eq!(colormap(f64::NAN), colormap(0.0));
        assert_eq!(colormap(7.0), colormap(1.0));
    }

    #[test]
    fn glyphs_fall_back_for_unknown_characters() {
        assert_ne!(glyph('A'), [0; 8]);
        assert_eq!(glyph('\u{2603}'), glyph('?'));
        assert_eq!(text_width("abc", 2), 48);
    }

    #[test]
    fn confusion_png_is_titled_and_labelled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.png");
        let cm = ConfusionMatrix::new(&[0, 1, 2, 2], &[0, 2, 2, 2]).unwrap();
        let title = "Confusion Matrix for Test Data";
        render_confusion_png(&cm, title, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        let geo = ConfusionGeometry::new(&cm, title);
        assert_eq!((img.width(), img.height()), (geo.width, geo.height));
        assert!(img.width() >= 2 * MARGIN + text_width(title, TEXT_SCALE));

        // Cell (2, 2) holds the maximum count; its corner keeps the cell colour.
        let corner = (geo.grid_x + 2 * CELL + 2, geo.grid_y + 2 * CELL + 2);
        assert_eq!(*img.get_pixel(corner.0, corner.1), colormap(1.0));

        // Title band, x-axis title band and y-axis title column all carry text.
        assert!(has_ink(&img, 0, MARGIN, img.width(), LINE));
        assert!(has_ink(&img, geo.grid_x, geo.grid_y + geo.grid + 2 * PAD + LINE, geo.grid, LINE));
        assert!(has_ink(&img, MARGIN, geo.grid_y, LINE, geo.height - geo.grid_y - MARGIN));
    }

    #[test]
    fn confusion_title_changes_the_render() {
        let dir = tempfile::tempdir().unwrap();
        let cm = ConfusionMatrix::new(&[0, 1], &[0, 1]).unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        render_confusion_png(&cm, "Confusion Matrix for Validation Data", &a).unwrap();
        render_confusion_png(&cm, "Confusion Matrix for Test Data", &b).unwrap();
        assert_ne!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn sample_png_carries_its_caption() {
        let dir = tempfile::tempdir().unwrap();
        let image = Array2::from_shape_fn((8, 4), |(r, c)| (r * 4 + c) as f32);
        let caption = |id: &str| {
            vec![
                format!("PatientID: {}", id),
                "Actual Label: 1".to_string(),
                "Model Predicted Label: 0".to_string(),
            ]
        };
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        render_sample_png(&image, &caption("PATIENT-A"), &a).unwrap();
        render_sample_png(&image, &caption("PATIENT-B"), &b).unwrap();

        let img = image::open(&a).unwrap().to_rgb8();
        let text_w = text_width("Model Predicted Label: 0", TEXT_SCALE);
        assert_eq!(img.width(), 2 * MARGIN + text_w.max(4 * 32));
        assert_eq!(img.height(), 2 * MARGIN + 3 * (LINE + PAD) + 8 * 32);
        assert!(has_ink(&img, 0, MARGIN, img.width(), LINE));
        assert_ne!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn flat_image_renders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        render_sample_png(&Array2::from_elem((8, 4), 3.0), &[], &path).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (2 * MARGIN + 4 * 32, 2 * MARGIN + 8 * 32));
    }

    #[test]
    fn heatmap_html_carries_title_and_axes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.html");
        let cm = ConfusionMatrix::new(&[1, 1], &[1, 0]).unwrap();
        write_plot_html(&plot_confusion_matrix(&cm, "Confusion Matrix for Test Data"), &path).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("Confusion Matrix for Test Data"));
        assert!(html.contains("Predicted label"));
    }

    #[test]
    fn sample_heatmap_keeps_the_first_row_on_top() {
        let image = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let json = plot_sample(&image, "PatientID: P1").to_json();
        assert!(json.contains("[[3.0,4.0],[1.0,2.0]]"));
        assert!(json.contains("PatientID: P1"));
    }
}
