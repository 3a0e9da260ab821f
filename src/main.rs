//! Interactive control surface for the glyph detector.
//!
//! Reads commands from stdin and drives the [`DetectorController`]; status
//! updates from the detection thread are printed by a drain thread. This is
//! deliberately a thin shell — all detector behavior lives in the library.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use attack_detector::capture::XcapScreen;
use attack_detector::input::{EnigoInput, InputDriver};
use attack_detector::ocr::{DigitReader, TesseractReader};
use attack_detector::{
    DetectorController, JsonSettingsStore, Mode, StatusUpdate, TemplateCatalog, TemplateStore,
    Verdict, calibration,
};

fn config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("attack-detector").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("detector_config.json"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = JsonSettingsStore::new(config_path());
    let templates = Arc::new(TemplateStore::load(&TemplateCatalog::new(
        "assets/templates",
    )));

    let screen = Arc::new(XcapScreen);
    let input = Arc::new(EnigoInput::new().context("could not initialize the mouse driver")?);
    let ocr: Option<Arc<dyn DigitReader>> = match TesseractReader::new() {
        Ok(reader) => Some(Arc::new(reader)),
        Err(e) => {
            warn!("OCR unavailable, template matching only: {e}");
            None
        }
    };

    let (mut controller, status_rx) = DetectorController::new(
        templates,
        screen,
        Arc::clone(&input) as Arc<dyn InputDriver>,
        ocr,
        Box::new(store),
    );

    // Status drain: applies detection-thread updates on the surface's side.
    thread::spawn(move || {
        for update in status_rx {
            match update {
                StatusUpdate::Started(mode) => println!("* {mode} mode: running"),
                StatusUpdate::Paused(mode) => println!("* {mode} mode: paused"),
                StatusUpdate::Resumed(mode) => println!("* {mode} mode: running"),
                StatusUpdate::Stopped(mode) => println!("* {mode} mode: stopped"),
                StatusUpdate::Clicked {
                    glyph,
                    confidence,
                    count,
                    x,
                    y,
                    ..
                } => println!(
                    "* clicked at ({x}, {y}) for glyph {glyph}, detection #{count} ({confidence:.2})"
                ),
                StatusUpdate::CycleFailed(reason) => println!("* cycle skipped: {reason}"),
            }
        }
    });

    print_help();
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let command = match parts.next() {
            Some(cmd) => cmd,
            None => continue,
        };

        let result = match command {
            "start" => {
                parse_mode(parts.next()).and_then(|mode| controller.start(mode).map_err(Into::into))
            }
            "pause" => controller.pause().map_err(Into::into),
            "resume" => controller.resume().map_err(Into::into),
            "stop" => controller.stop().map_err(Into::into),
            "set-click" => set_click(&mut controller, input.as_ref()),
            "set-region" => parse_mode(parts.next())
                .and_then(|mode| set_region(&mut controller, input.as_ref(), mode)),
            "threshold" | "cooldown" | "interval" => {
                update_one(&mut controller, command, parts.next())
            }
            "good" => rate(&mut controller, Verdict::Good),
            "bad" => rate(&mut controller, Verdict::Bad),
            "status" => {
                println!(
                    "{}, {} detections this run",
                    controller.state(),
                    controller.detection_count()
                );
                Ok(())
            }
            "help" => {
                print_help();
                Ok(())
            }
            "exit" | "quit" => break,
            other => {
                println!("unknown command: {other} (try 'help')");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("error: {e}");
        }
        io::stdout().flush().ok();
    }

    // Persist before terminating; a failed save is logged, not fatal.
    if !controller.state().is_idle() {
        if let Err(e) = controller.stop() {
            warn!("could not stop detection cleanly: {e}");
        }
    }
    if let Err(e) = controller.save() {
        warn!("could not save settings on exit: {e}");
    }
    Ok(())
}

fn parse_mode(arg: Option<&str>) -> Result<Mode> {
    match arg {
        Some("elemental") => Ok(Mode::Elemental),
        Some("physical") => Ok(Mode::Physical),
        other => anyhow::bail!("expected 'elemental' or 'physical', got {other:?}"),
    }
}

fn set_click(controller: &mut DetectorController, input: &dyn InputDriver) -> Result<()> {
    println!("move the mouse to the click target...");
    let (x, y) = calibration::capture_click_point(
        input,
        calibration::DEFAULT_COUNTDOWN_SECS,
        thread::sleep,
        |s| println!("capturing in {s}..."),
    )?;
    controller.set_click_point(x, y)?;
    println!("click position set to ({x}, {y})");
    Ok(())
}

fn set_region(
    controller: &mut DetectorController,
    input: &dyn InputDriver,
    mode: Mode,
) -> Result<()> {
    println!("hover the TOP-LEFT corner, then the BOTTOM-RIGHT corner of the region");
    let region = calibration::capture_region(
        input,
        calibration::DEFAULT_COUNTDOWN_SECS,
        thread::sleep,
        |s| println!("capturing in {s}..."),
    )?;
    controller.set_region(mode, region)?;
    println!(
        "{mode} region set to ({}, {}) {}x{}",
        region.x, region.y, region.width, region.height
    );
    Ok(())
}

fn update_one(controller: &mut DetectorController, which: &str, arg: Option<&str>) -> Result<()> {
    let value: f64 = arg
        .context("missing value")?
        .parse()
        .context("not a number")?;
    let settings = controller.settings();
    let (mut threshold, mut cooldown, mut interval) = (
        settings.match_threshold,
        settings.click_cooldown,
        settings.check_interval,
    );
    match which {
        "threshold" => threshold = value as f32,
        "cooldown" => cooldown = value,
        _ => interval = value,
    }
    controller.update_settings(threshold, cooldown, interval)?;
    println!("settings saved");
    Ok(())
}

fn rate(controller: &mut DetectorController, verdict: Verdict) -> Result<()> {
    let record = controller.submit_feedback(verdict)?;
    println!(
        "recorded {:?} for glyph {} ({:.2})",
        verdict, record.glyph, record.confidence
    );
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  start elemental|physical        begin detection");
    println!("  pause / resume / stop           control the active run");
    println!("  set-click                       calibrate the fixed click position");
    println!("  set-region elemental|physical   calibrate a detection region");
    println!("  threshold|cooldown|interval <value>   tune and save settings");
    println!("  good / bad                      rate the most recent detection");
    println!("  status / help / exit");
}
