//! Template matching via zero-mean normalized cross-correlation.
//!
//! Matching slides each template over the captured raster and scores every
//! placement with ZNCC, equivalent to OpenCV's `TM_CCOEFF_NORMED`. Window
//! mean and variance come from integral images so only the cross term is
//! recomputed per placement.

use image::GrayImage;
use tracing::debug;

use crate::capture::Frame;
use crate::templates::{Glyph, Template};

/// Scanning further variants of the same glyph cannot meaningfully improve
/// on a match this strong.
const HIGH_CONFIDENCE: f32 = 0.9;

/// A confirmed glyph detection.
///
/// `x`/`y` are the center of the matched template in absolute screen
/// coordinates. `confidence` is 0.0 for OCR-produced detections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub glyph: Glyph,
    pub x: i32,
    pub y: i32,
    pub confidence: f32,
}

/// Summed-area tables over pixel values and their squares.
struct IntegralImage {
    sum: Vec<f64>,
    sq: Vec<f64>,
    stride: usize,
}

impl IntegralImage {
    fn new(raster: &GrayImage) -> Self {
        let (w, h) = raster.dimensions();
        let stride = w as usize + 1;
        let mut sum = vec![0.0; stride * (h as usize + 1)];
        let mut sq = vec![0.0; stride * (h as usize + 1)];
        for y in 0..h as usize {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w as usize {
                let v = raster.as_raw()[y * w as usize + x] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { sum, sq, stride }
    }

    /// Sum and sum-of-squares over the window with top-left (x, y).
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = &self.sum;
        let q = &self.sq;
        let n = self.stride;
        let a = y * n + x;
        let b = y * n + x + w;
        let c = (y + h) * n + x;
        let d = (y + h) * n + x + w;
        (s[d] - s[b] - s[c] + s[a], q[d] - q[b] - q[c] + q[a])
    }
}

/// Best normalized cross-correlation of `template` within `raster`.
///
/// Returns the top-left corner of the best-scoring placement and its score
/// clamped to [0, 1]. `None` when the template exceeds the raster in either
/// dimension or carries no intensity variation to correlate against.
pub fn best_match(raster: &GrayImage, template: &GrayImage) -> Option<(u32, u32, f32)> {
    let (rw, rh) = raster.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > rw || th > rh {
        return None;
    }

    let n = (tw * th) as f64;
    let tpl: Vec<f64> = template.as_raw().iter().map(|&p| p as f64).collect();
    let tpl_mean = tpl.iter().sum::<f64>() / n;
    let tpl_dev: Vec<f64> = tpl.iter().map(|v| v - tpl_mean).collect();
    let tpl_sq: f64 = tpl_dev.iter().map(|v| v * v).sum();
    if tpl_sq <= f64::EPSILON {
        return None;
    }

    let integral = IntegralImage::new(raster);
    let raw = raster.as_raw();
    let row_len = rw as usize;

    let mut best = (0u32, 0u32, f32::MIN);
    for oy in 0..=(rh - th) {
        for ox in 0..=(rw - tw) {
            let (win_sum, win_sq) = integral.window(ox as usize, oy as usize, tw as usize, th as usize);
            let win_var = win_sq - win_sum * win_sum / n;
            if win_var <= f64::EPSILON {
                continue;
            }

            // The template deviations sum to zero, so the window mean drops
            // out of the cross term.
            let mut num = 0.0;
            let mut i = 0usize;
            for y in 0..th as usize {
                let row = (oy as usize + y) * row_len + ox as usize;
                for x in 0..tw as usize {
                    num += raw[row + x] as f64 * tpl_dev[i];
                    i += 1;
                }
            }

            let score = (num / (win_var * tpl_sq).sqrt()) as f32;
            if score > best.2 {
                best = (ox, oy, score);
            }
        }
    }

    if best.2 == f32::MIN {
        // Every window was flat; nothing to correlate against.
        return None;
    }
    Some((best.0, best.1, best.2.clamp(0.0, 1.0)))
}

/// Runs the priority-ordered multi-template match over one frame.
///
/// Classes are walked in the order given (highest priority first). Within a
/// class the highest-confidence variant wins; if that best meets
/// `threshold` the class is accepted and lower-priority classes are never
/// evaluated. Reported coordinates are the center of the matched template
/// plus the frame's capture offset.
pub fn match_all(
    frame: &Frame,
    classes: &[(Glyph, Vec<Template>)],
    threshold: f32,
) -> Option<Detection> {
    for (glyph, templates) in classes {
        let mut class_best: Option<(u32, u32, f32, &Template)> = None;
        for template in templates {
            let Some((x, y, score)) = best_match(&frame.raster, &template.image) else {
                continue;
            };
            if class_best.map_or(true, |(_, _, best_score, _)| score > best_score) {
                class_best = Some((x, y, score, template));
            }
            if score >= HIGH_CONFIDENCE {
                break;
            }
        }

        let Some((x, y, score, template)) = class_best else {
            continue;
        };
        if score >= threshold {
            let (tw, th) = template.image.dimensions();
            let (ax, ay) = frame.to_absolute(x + tw / 2, y + th / 2);
            debug!(
                "matched glyph {} via {} at ({}, {}) confidence {:.2}",
                glyph, template.name, ax, ay, score
            );
            return Some(Detection {
                glyph: *glyph,
                x: ax,
                y: ay,
                confidence: score,
            });
        }
    }
    None
}
