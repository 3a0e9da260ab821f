//! The per-run detection cycle loop.
//!
//! Runs on a dedicated background thread, one cycle per check interval:
//! capture → template match → OCR fallback → cooldown-gated click. A failed
//! cycle is logged and skipped; only the stop flag ends the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{info, warn};

use crate::capture::{self, ScreenSource};
use crate::config::{Region, Settings};
use crate::errors::DetectorResult;
use crate::input::InputDriver;
use crate::matcher::{self, Detection};
use crate::ocr::{self, DigitReader};
use crate::templates::{Glyph, Mode, TemplateStore};

use super::controller::PendingDetection;
use super::status::StatusUpdate;

/// Poll interval while paused: cheap enough not to matter, short enough
/// that resume feels immediate.
const PAUSE_POLL: Duration = Duration::from_millis(500);

/// Everything one run needs. Settings are cloned in at start, so they stay
/// frozen for the duration of the run.
pub(super) struct WorkerContext {
    pub mode: Mode,
    pub settings: Settings,
    pub templates: Arc<TemplateStore>,
    pub screen: Arc<dyn ScreenSource>,
    pub input: Arc<dyn InputDriver>,
    pub ocr: Option<Arc<dyn DigitReader>>,
    pub running: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
    pub clicks: Arc<AtomicU64>,
    pub pending: Arc<Mutex<Option<PendingDetection>>>,
    pub status: Sender<StatusUpdate>,
}

pub(super) fn run_detection_loop(ctx: WorkerContext) {
    let interval = ctx.settings.interval();
    let cooldown = ctx.settings.cooldown();
    let region = ctx.settings.region_for(ctx.mode);
    let mut last_click: Option<Instant> = None;

    info!("{} detection loop started", ctx.mode);
    while ctx.running.load(Ordering::SeqCst) {
        if ctx.paused.load(Ordering::SeqCst) {
            thread::sleep(PAUSE_POLL);
            continue;
        }

        if let Err(e) = run_cycle(&ctx, region.as_ref(), cooldown, &mut last_click) {
            warn!("detection cycle failed: {e}");
            let _ = ctx.status.send(StatusUpdate::CycleFailed(e.to_string()));
        }

        thread::sleep(interval);
    }
    info!("{} detection loop finished", ctx.mode);
}

/// One capture/match/click cycle.
fn run_cycle(
    ctx: &WorkerContext,
    region: Option<&Region>,
    cooldown: Duration,
    last_click: &mut Option<Instant>,
) -> DetectorResult<()> {
    let frame = capture::grab(ctx.screen.as_ref(), region)?;

    let mut detection = matcher::match_all(
        &frame,
        ctx.templates.classes(ctx.mode),
        ctx.settings.match_threshold,
    );

    if detection.is_none() {
        if let Some(reader) = &ctx.ocr {
            if let Some((glyph, cx, cy)) =
                ocr::scan_candidates(reader.as_ref(), &frame.raster, &Glyph::PRIORITY)
            {
                let (x, y) = frame.to_absolute(cx, cy);
                detection = Some(Detection {
                    glyph,
                    x,
                    y,
                    confidence: 0.0,
                });
            }
        }
    }

    let Some(detection) = detection else {
        return Ok(());
    };

    let now = Instant::now();
    if last_click.is_some_and(|t| now.duration_since(t) < cooldown) {
        // Still cooling down: the detection is dropped, not queued.
        return Ok(());
    }

    let (x, y) = ctx
        .settings
        .click_coordinates
        .unwrap_or((detection.x, detection.y));
    ctx.input.click(x, y)?;
    *last_click = Some(now);

    let count = ctx.clicks.fetch_add(1, Ordering::SeqCst) + 1;
    if let Ok(mut pending) = ctx.pending.lock() {
        *pending = Some(PendingDetection {
            glyph: detection.glyph,
            mode: ctx.mode,
            confidence: detection.confidence,
            timestamp: Local::now(),
        });
    }

    info!(
        "clicked at ({}, {}) for glyph {} (detection #{}, confidence {:.2})",
        x, y, detection.glyph, count, detection.confidence
    );
    let _ = ctx.status.send(StatusUpdate::Clicked {
        mode: ctx.mode,
        glyph: detection.glyph,
        confidence: detection.confidence,
        count,
        x,
        y,
    });
    Ok(())
}
