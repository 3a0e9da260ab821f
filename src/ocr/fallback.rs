//! Candidate-region OCR scan.
//!
//! The glyph usually renders in one of two screen areas, so the fallback
//! crops those fixed candidates out of the captured raster (wherever it
//! came from), runs single-character OCR on each, and takes the first
//! in-set digit. Per-region engine failures are swallowed; the next
//! candidate is tried.

use image::{GrayImage, imageops};
use tracing::debug;

use super::DigitReader;
use crate::templates::Glyph;

/// A raster-local candidate rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// The fixed scan list, derived from the raster dimensions and clamped to
/// its bounds: one box around the screen center, one right of it.
fn candidate_regions(width: u32, height: u32) -> Vec<Candidate> {
    let band_y = (height / 2).saturating_sub(100);
    let raw = [
        (width / 2, band_y, 200, 100),
        (width.saturating_sub(300), band_y, 250, 150),
    ];

    raw.iter()
        .filter_map(|&(x, y, w, h)| {
            let x = x.min(width.saturating_sub(w));
            let y = y.min(height.saturating_sub(h));
            let w = w.min(width - x);
            let h = h.min(height - y);
            if w == 0 || h == 0 {
                return None;
            }
            Some(Candidate {
                x,
                y,
                width: w,
                height: h,
            })
        })
        .collect()
}

/// Scans the candidate regions in order and returns the first recognized
/// target digit with the raster-local center of its region.
///
/// Total OCR failure is a non-detection, never an error.
pub fn scan_candidates(
    reader: &dyn DigitReader,
    raster: &GrayImage,
    targets: &[Glyph],
) -> Option<(Glyph, u32, u32)> {
    for candidate in candidate_regions(raster.width(), raster.height()) {
        let crop = imageops::crop_imm(
            raster,
            candidate.x,
            candidate.y,
            candidate.width,
            candidate.height,
        )
        .to_image();

        let text = match reader.read_digits(&crop) {
            Ok(text) => text,
            Err(e) => {
                debug!(
                    "OCR failed on candidate at ({}, {}): {}",
                    candidate.x, candidate.y, e
                );
                continue;
            }
        };

        for ch in text.chars() {
            if let Some(glyph) = Glyph::from_digit(ch) {
                if targets.contains(&glyph) {
                    debug!(
                        "OCR recognized {} in candidate at ({}, {})",
                        glyph, candidate.x, candidate.y
                    );
                    return Some((
                        glyph,
                        candidate.x + candidate.width / 2,
                        candidate.y + candidate.height / 2,
                    ));
                }
            }
        }
    }
    None
}
