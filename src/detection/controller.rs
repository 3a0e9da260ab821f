//! The detection controller.
//!
//! Owns the run state, the background detection thread, and the settings
//! instance. The control surface renders from this object's query methods
//! and sends commands through it; nothing else mutates detector state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::capture::ScreenSource;
use crate::config::{FeedbackRecord, Region, Settings, SettingsStore, Verdict};
use crate::errors::{DetectorError, DetectorResult};
use crate::input::InputDriver;
use crate::ocr::DigitReader;
use crate::templates::{Glyph, Mode, TemplateStore};

use super::state::RunState;
use super::status::{StatusUpdate, status_channel};
use super::worker::{WorkerContext, run_detection_loop};

/// The most recent click-producing detection, held until the operator
/// rates it.
#[derive(Clone, Debug)]
pub struct PendingDetection {
    pub glyph: Glyph,
    pub mode: Mode,
    pub confidence: f32,
    pub timestamp: DateTime<Local>,
}

/// Coordinates detection runs and settings changes.
///
/// All methods are called from the control-surface thread. While a run is
/// active the worker holds a frozen copy of the settings, so mutating
/// commands are rejected until `stop`.
pub struct DetectorController {
    templates: Arc<TemplateStore>,
    screen: Arc<dyn ScreenSource>,
    input: Arc<dyn InputDriver>,
    ocr: Option<Arc<dyn DigitReader>>,
    store: Box<dyn SettingsStore>,
    settings: Settings,
    state: RunState,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    clicks: Arc<AtomicU64>,
    pending: Arc<Mutex<Option<PendingDetection>>>,
    status_tx: Sender<StatusUpdate>,
    worker: Option<JoinHandle<()>>,
}

impl DetectorController {
    /// Loads settings from the store and wires up the collaborators.
    ///
    /// Returns the controller together with the receiving end of the
    /// status channel for the control surface to drain.
    pub fn new(
        templates: Arc<TemplateStore>,
        screen: Arc<dyn ScreenSource>,
        input: Arc<dyn InputDriver>,
        ocr: Option<Arc<dyn DigitReader>>,
        store: Box<dyn SettingsStore>,
    ) -> (Self, Receiver<StatusUpdate>) {
        let settings = store.load();
        let (status_tx, status_rx) = status_channel();
        let controller = Self {
            templates,
            screen,
            input,
            ocr,
            store,
            settings,
            state: RunState::Idle,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            clicks: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(None)),
            status_tx,
            worker: None,
        };
        (controller, status_rx)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Clicks issued by the current (or last) run.
    pub fn detection_count(&self) -> u64 {
        self.clicks.load(Ordering::SeqCst)
    }

    /// Starts a detection run. Legal only from `Idle`; starting one mode
    /// blocks the other until `stop`.
    pub fn start(&mut self, mode: Mode) -> DetectorResult<()> {
        if !self.state.is_idle() {
            return Err(DetectorError::AlreadyRunning);
        }

        self.running.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.clicks.store(0, Ordering::SeqCst);

        let ctx = WorkerContext {
            mode,
            settings: self.settings.clone(),
            templates: Arc::clone(&self.templates),
            screen: Arc::clone(&self.screen),
            input: Arc::clone(&self.input),
            ocr: self.ocr.clone(),
            running: Arc::clone(&self.running),
            paused: Arc::clone(&self.paused),
            clicks: Arc::clone(&self.clicks),
            pending: Arc::clone(&self.pending),
            status: self.status_tx.clone(),
        };
        self.worker = Some(std::thread::spawn(move || run_detection_loop(ctx)));
        self.state = RunState::Running(mode);
        let _ = self.status_tx.send(StatusUpdate::Started(mode));
        info!("{mode} detection started");
        Ok(())
    }

    /// Pauses the running cycle. The worker keeps polling cheaply but
    /// performs no capture, match, or click until `resume`.
    pub fn pause(&mut self) -> DetectorResult<()> {
        match self.state {
            RunState::Running(mode) => {
                self.paused.store(true, Ordering::SeqCst);
                self.state = RunState::Paused(mode);
                let _ = self.status_tx.send(StatusUpdate::Paused(mode));
                Ok(())
            }
            _ => Err(DetectorError::NotRunning),
        }
    }

    pub fn resume(&mut self) -> DetectorResult<()> {
        match self.state {
            RunState::Paused(mode) => {
                self.paused.store(false, Ordering::SeqCst);
                self.state = RunState::Running(mode);
                let _ = self.status_tx.send(StatusUpdate::Resumed(mode));
                Ok(())
            }
            _ => Err(DetectorError::NotRunning),
        }
    }

    /// Stops the run and joins the worker thread. Legal from `Running` or
    /// `Paused`; the worker observes the flag within one cycle.
    pub fn stop(&mut self) -> DetectorResult<()> {
        let mode = match self.state {
            RunState::Running(mode) | RunState::Paused(mode) => mode,
            RunState::Idle => return Err(DetectorError::NotRunning),
        };

        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("detection thread panicked");
            }
        }
        self.state = RunState::Idle;
        let _ = self.status_tx.send(StatusUpdate::Stopped(mode));
        info!("{mode} detection stopped");
        Ok(())
    }

    /// Updates the tunable parameters and persists them. Rejected while a
    /// run is active (the worker's copy is frozen).
    pub fn update_settings(
        &mut self,
        threshold: f32,
        cooldown: f64,
        interval: f64,
    ) -> DetectorResult<()> {
        self.ensure_idle()?;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(DetectorError::InvalidSetting(format!(
                "match threshold {threshold} must be within 0.0 and 1.0"
            )));
        }
        if !cooldown.is_finite() || cooldown <= 0.0 {
            return Err(DetectorError::InvalidSetting(format!(
                "click cooldown {cooldown} must be positive"
            )));
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(DetectorError::InvalidSetting(format!(
                "check interval {interval} must be positive"
            )));
        }

        self.settings.match_threshold = threshold;
        self.settings.click_cooldown = cooldown;
        self.settings.check_interval = interval;
        self.save()
    }

    /// Sets the fixed click target and persists it.
    pub fn set_click_point(&mut self, x: i32, y: i32) -> DetectorResult<()> {
        self.ensure_idle()?;
        self.settings.click_coordinates = Some((x, y));
        self.save()
    }

    /// Sets a mode's detection region and persists it.
    pub fn set_region(&mut self, mode: Mode, region: Region) -> DetectorResult<()> {
        self.ensure_idle()?;
        self.settings.set_region_for(mode, region);
        self.save()
    }

    /// Rates the most recent detection. Each detection can be rated once;
    /// with nothing pending this is an error the surface shows the user.
    pub fn submit_feedback(&mut self, verdict: Verdict) -> DetectorResult<FeedbackRecord> {
        let Some(pending) = self.pending.lock().ok().and_then(|mut p| p.take()) else {
            return Err(DetectorError::NoPendingDetection);
        };
        let record = FeedbackRecord {
            glyph: pending.glyph,
            mode: pending.mode,
            confidence: pending.confidence,
            verdict,
            timestamp: pending.timestamp,
        };
        self.settings.feedback.push(record.clone());
        self.save()?;
        Ok(record)
    }

    /// Persists the current settings and feedback.
    pub fn save(&self) -> DetectorResult<()> {
        self.store.save(&self.settings)
    }

    fn ensure_idle(&self) -> DetectorResult<()> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(DetectorError::SettingsLocked)
        }
    }
}

impl Drop for DetectorController {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ScreenSource;
    use crate::templates::Template;
    use image::{GrayImage, Luma};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn glyph_image(seed: u32) -> GrayImage {
        GrayImage::from_fn(8, 6, |x, y| {
            Luma([((x * 31 + y * 17 + seed * 7) % 251) as u8])
        })
    }

    /// Screen whose raster always contains the given template at (20, 12).
    struct MatchingScreen {
        template: GrayImage,
        captures: Arc<AtomicUsize>,
    }

    impl ScreenSource for MatchingScreen {
        fn capture(&self, region: Option<&Region>) -> DetectorResult<GrayImage> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            let (w, h) = match region {
                Some(r) => (r.width, r.height),
                None => (60, 40),
            };
            let mut raster = GrayImage::from_pixel(w, h, Luma([128]));
            for (x, y, p) in self.template.enumerate_pixels() {
                raster.put_pixel(20 + x, 12 + y, *p);
            }
            Ok(raster)
        }
    }

    /// Screen with nothing to detect.
    struct BlankScreen;

    impl ScreenSource for BlankScreen {
        fn capture(&self, _region: Option<&Region>) -> DetectorResult<GrayImage> {
            Ok(GrayImage::from_pixel(60, 40, Luma([128])))
        }
    }

    /// Screen that fails every capture.
    struct BrokenScreen {
        attempts: Arc<AtomicUsize>,
    }

    impl ScreenSource for BrokenScreen {
        fn capture(&self, _region: Option<&Region>) -> DetectorResult<GrayImage> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DetectorError::Capture("transient failure".into()))
        }
    }

    struct CountingInput {
        clicks: Arc<AtomicUsize>,
        last: Mutex<Option<(i32, i32)>>,
    }

    impl CountingInput {
        fn new() -> Self {
            Self {
                clicks: Arc::new(AtomicUsize::new(0)),
                last: Mutex::new(None),
            }
        }
    }

    impl InputDriver for CountingInput {
        fn click(&self, x: i32, y: i32) -> DetectorResult<()> {
            self.clicks.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some((x, y));
            Ok(())
        }

        fn cursor_position(&self) -> DetectorResult<(i32, i32)> {
            Ok((0, 0))
        }
    }

    struct MemoryStore {
        initial: Settings,
        saved: Arc<Mutex<Option<Settings>>>,
    }

    impl SettingsStore for MemoryStore {
        fn load(&self) -> Settings {
            self.initial.clone()
        }

        fn save(&self, settings: &Settings) -> DetectorResult<()> {
            *self.saved.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    /// Fast cycle, long cooldown: detections pile up but only the first
    /// one may click.
    fn test_settings() -> Settings {
        let mut settings = Settings::default();
        settings.match_threshold = 0.5;
        settings.check_interval = 0.01;
        settings.click_cooldown = 60.0;
        settings
    }

    fn build_controller(
        screen: Arc<dyn ScreenSource>,
        settings: Settings,
    ) -> (
        DetectorController,
        Receiver<StatusUpdate>,
        Arc<AtomicUsize>,
        Arc<Mutex<Option<Settings>>>,
    ) {
        let template = glyph_image(1);
        let store = Arc::new(TemplateStore::from_classes(
            vec![
                (Glyph::Six, vec![Template::new("six", template)]),
                (Glyph::Five, vec![]),
                (Glyph::Four, vec![]),
            ],
            vec![
                (Glyph::Six, vec![]),
                (Glyph::Five, vec![]),
                (Glyph::Four, vec![]),
            ],
        ));
        let input = Arc::new(CountingInput::new());
        let clicks = Arc::clone(&input.clicks);
        let saved = Arc::new(Mutex::new(None));
        let memory = MemoryStore {
            initial: settings,
            saved: Arc::clone(&saved),
        };
        let (controller, rx) =
            DetectorController::new(store, screen, input, None, Box::new(memory));
        (controller, rx, clicks, saved)
    }

    fn matching_screen() -> (Arc<MatchingScreen>, Arc<AtomicUsize>) {
        let captures = Arc::new(AtomicUsize::new(0));
        let screen = Arc::new(MatchingScreen {
            template: glyph_image(1),
            captures: Arc::clone(&captures),
        });
        (screen, captures)
    }

    #[test]
    fn test_cooldown_allows_exactly_one_click() {
        let (screen, _) = matching_screen();
        let (mut controller, rx, clicks, _) = build_controller(screen, test_settings());

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        controller.stop().unwrap();

        // Dozens of cycles detected the glyph, but the 60s cooldown lets
        // only the first one through.
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert_eq!(controller.detection_count(), 1);

        let clicked = rx
            .try_iter()
            .filter(|u| matches!(u, StatusUpdate::Clicked { .. }))
            .count();
        assert_eq!(clicked, 1);
    }

    #[test]
    fn test_click_lands_on_detected_center() {
        let (screen, _) = matching_screen();
        let template = glyph_image(1);
        let store = Arc::new(TemplateStore::from_classes(
            vec![(Glyph::Six, vec![Template::new("six", template)])],
            Vec::new(),
        ));
        let input = Arc::new(CountingInput::new());
        let input_handle = Arc::clone(&input);
        let memory = MemoryStore {
            initial: test_settings(),
            saved: Arc::new(Mutex::new(None)),
        };
        let (mut controller, _rx) =
            DetectorController::new(store, screen, input, None, Box::new(memory));

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        controller.stop().unwrap();

        // 8x6 template embedded at (20, 12), full-screen capture, so the
        // click lands on the template center.
        assert_eq!(*input_handle.last.lock().unwrap(), Some((24, 15)));
    }

    #[test]
    fn test_region_capture_offsets_the_click() {
        let (screen, captures) = matching_screen();
        let mut settings = test_settings();
        settings.elemental_region = Some(Region {
            x: 100,
            y: 50,
            width: 200,
            height: 200,
        });

        let template = glyph_image(1);
        let store = Arc::new(TemplateStore::from_classes(
            vec![(Glyph::Six, vec![Template::new("six", template)])],
            Vec::new(),
        ));
        let input = Arc::new(CountingInput::new());
        let input_handle = Arc::clone(&input);
        let memory = MemoryStore {
            initial: settings,
            saved: Arc::new(Mutex::new(None)),
        };
        let (mut controller, _rx) =
            DetectorController::new(store, screen, input, None, Box::new(memory));

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        controller.stop().unwrap();

        assert!(captures.load(Ordering::SeqCst) > 0);
        // Template at raster-local (20, 12) inside the (100, 50) region;
        // the click target adds the region offset and the half-size.
        assert_eq!(*input_handle.last.lock().unwrap(), Some((124, 65)));
    }

    #[test]
    fn test_fixed_click_coordinates_override_detection() {
        let (screen, _) = matching_screen();
        let mut settings = test_settings();
        settings.click_coordinates = Some((7, 9));

        let template = glyph_image(1);
        let store = Arc::new(TemplateStore::from_classes(
            vec![(Glyph::Six, vec![Template::new("six", template)])],
            Vec::new(),
        ));
        let input = Arc::new(CountingInput::new());
        let input_handle = Arc::clone(&input);
        let memory = MemoryStore {
            initial: settings,
            saved: Arc::new(Mutex::new(None)),
        };
        let (mut controller, _rx) =
            DetectorController::new(store, screen, input, None, Box::new(memory));

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        controller.stop().unwrap();

        assert_eq!(*input_handle.last.lock().unwrap(), Some((7, 9)));
    }

    #[test]
    fn test_start_is_rejected_unless_idle() {
        let (screen, _) = matching_screen();
        let (mut controller, _rx, _clicks, _) = build_controller(screen, test_settings());

        controller.start(Mode::Elemental).unwrap();
        assert!(matches!(
            controller.start(Mode::Physical),
            Err(DetectorError::AlreadyRunning)
        ));
        controller.pause().unwrap();
        assert!(matches!(
            controller.start(Mode::Elemental),
            Err(DetectorError::AlreadyRunning)
        ));
        controller.stop().unwrap();

        // Idle again: either mode may start.
        controller.start(Mode::Physical).unwrap();
        controller.stop().unwrap();
    }

    #[test]
    fn test_settings_locked_while_running() {
        let (screen, _) = matching_screen();
        let (mut controller, _rx, _clicks, _) = build_controller(screen, test_settings());

        controller.start(Mode::Elemental).unwrap();
        assert!(matches!(
            controller.update_settings(0.8, 1.0, 0.3),
            Err(DetectorError::SettingsLocked)
        ));
        assert!(matches!(
            controller.set_click_point(1, 1),
            Err(DetectorError::SettingsLocked)
        ));
        let region = Region {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
        };
        assert!(matches!(
            controller.set_region(Mode::Elemental, region),
            Err(DetectorError::SettingsLocked)
        ));
        controller.stop().unwrap();

        controller.update_settings(0.8, 1.5, 0.2).unwrap();
        assert_eq!(controller.settings().match_threshold, 0.8);
    }

    #[test]
    fn test_invalid_settings_rejected_and_unchanged() {
        let (screen, _) = matching_screen();
        let (mut controller, _rx, _clicks, saved) = build_controller(screen, test_settings());

        assert!(matches!(
            controller.update_settings(1.5, 1.0, 0.3),
            Err(DetectorError::InvalidSetting(_))
        ));
        assert!(matches!(
            controller.update_settings(0.8, 0.0, 0.3),
            Err(DetectorError::InvalidSetting(_))
        ));
        assert_eq!(controller.settings().match_threshold, 0.5);
        assert!(saved.lock().unwrap().is_none(), "nothing was persisted");
    }

    #[test]
    fn test_pause_suspends_captures_and_resume_restores_them() {
        let (screen, captures) = matching_screen();
        let (mut controller, _rx, _clicks, _) = build_controller(screen, test_settings());

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        controller.pause().unwrap();
        // Let any in-flight cycle finish before sampling.
        std::thread::sleep(Duration::from_millis(50));
        let at_pause = captures.load(Ordering::SeqCst);
        assert!(at_pause > 0);

        std::thread::sleep(Duration::from_millis(250));
        let while_paused = captures.load(Ordering::SeqCst);
        assert!(
            while_paused <= at_pause + 1,
            "captures kept running while paused: {at_pause} -> {while_paused}"
        );

        controller.resume().unwrap();
        // The worker may sit out one 500ms pause poll before it notices.
        std::thread::sleep(Duration::from_millis(700));
        let after_resume = captures.load(Ordering::SeqCst);
        assert!(
            after_resume > while_paused,
            "cycling did not resume: {while_paused} -> {after_resume}"
        );
        controller.stop().unwrap();
    }

    #[test]
    fn test_cycle_errors_do_not_stop_the_loop() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let screen = Arc::new(BrokenScreen {
            attempts: Arc::clone(&attempts),
        });
        let (mut controller, rx, clicks, _) = build_controller(screen, test_settings());

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        controller.stop().unwrap();

        assert!(
            attempts.load(Ordering::SeqCst) > 1,
            "loop must survive failing cycles"
        );
        assert_eq!(clicks.load(Ordering::SeqCst), 0);
        assert!(
            rx.try_iter()
                .any(|u| matches!(u, StatusUpdate::CycleFailed(_)))
        );
    }

    #[test]
    fn test_feedback_rates_the_last_detection_once() {
        let (screen, _) = matching_screen();
        let (mut controller, _rx, _clicks, saved) = build_controller(screen, test_settings());

        // Nothing detected yet.
        assert!(matches!(
            controller.submit_feedback(Verdict::Good),
            Err(DetectorError::NoPendingDetection)
        ));

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        controller.stop().unwrap();

        let record = controller.submit_feedback(Verdict::Good).unwrap();
        assert_eq!(record.glyph, Glyph::Six);
        assert_eq!(record.mode, Mode::Elemental);
        assert_eq!(record.verdict, Verdict::Good);
        assert_eq!(controller.settings().feedback.len(), 1);
        assert_eq!(saved.lock().unwrap().as_ref().unwrap().feedback.len(), 1);

        // The same detection cannot be rated twice.
        assert!(matches!(
            controller.submit_feedback(Verdict::Bad),
            Err(DetectorError::NoPendingDetection)
        ));
    }

    #[test]
    fn test_no_detection_on_blank_screen() {
        let (mut controller, rx, clicks, _) =
            build_controller(Arc::new(BlankScreen), test_settings());

        controller.start(Mode::Elemental).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        controller.stop().unwrap();

        assert_eq!(clicks.load(Ordering::SeqCst), 0);
        assert!(
            !rx.try_iter()
                .any(|u| matches!(u, StatusUpdate::Clicked { .. }))
        );
    }
}
