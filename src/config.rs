//! Persistent settings and feedback storage.
//!
//! Settings load from a JSON file at startup and are written back on
//! explicit settings changes and on shutdown. Missing fields fall back to
//! defaults so older config files keep working; a corrupt file never blocks
//! startup.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{DetectorError, DetectorResult};
use crate::templates::{Glyph, Mode};

/// An axis-aligned screen rectangle in absolute coordinates.
///
/// Invariant: `width > 0 && height > 0`. Persisted as `[x, y, width, height]`,
/// the shape the original config files used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32, u32, u32)", into = "(i32, i32, u32, u32)")]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl From<(i32, i32, u32, u32)> for Region {
    fn from((x, y, width, height): (i32, i32, u32, u32)) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<Region> for (i32, i32, u32, u32) {
    fn from(region: Region) -> Self {
        (region.x, region.y, region.width, region.height)
    }
}

impl Region {
    /// Builds a region from two corner points in either order.
    ///
    /// Corners are normalized so the region's origin is the top-left.
    /// Coincident corners (zero width or height) are rejected.
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> DetectorResult<Self> {
        let x = a.0.min(b.0);
        let y = a.1.min(b.1);
        let width = (a.0.max(b.0) - x) as u32;
        let height = (a.1.max(b.1) - y) as u32;
        if width == 0 || height == 0 {
            return Err(DetectorError::DegenerateRegion);
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }
}

/// Operator rating of a detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Good,
    Bad,
}

/// One rated detection, appended when the operator rates the most recent
/// click and persisted alongside the settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub glyph: Glyph,
    pub mode: Mode,
    pub confidence: f32,
    pub verdict: Verdict,
    pub timestamp: DateTime<Local>,
}

/// Tunable detector parameters plus accumulated feedback.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minimum normalized cross-correlation score for a match, in [0, 1].
    pub match_threshold: f32,
    /// Minimum seconds between two clicks issued by the loop.
    pub click_cooldown: f64,
    /// Seconds between detection cycles.
    pub check_interval: f64,
    /// Fixed click target; `None` clicks at the detected location.
    pub click_coordinates: Option<(i32, i32)>,
    pub elemental_region: Option<Region>,
    pub physical_region: Option<Region>,
    /// Pre-split config files stored a single region under this name; it is
    /// folded into `elemental_region` on load and never written back.
    #[serde(rename = "detection_region", skip_serializing)]
    legacy_region: Option<Region>,
    pub feedback: Vec<FeedbackRecord>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            match_threshold: 0.7,
            click_cooldown: 1.0,
            check_interval: 0.3,
            click_coordinates: None,
            elemental_region: None,
            physical_region: None,
            legacy_region: None,
            feedback: Vec::new(),
        }
    }
}

impl Settings {
    /// Folds the legacy single-region field into `elemental_region` and
    /// replaces out-of-range numeric values with defaults.
    pub fn normalized(mut self) -> Self {
        if self.elemental_region.is_none() {
            self.elemental_region = self.legacy_region.take();
        } else {
            self.legacy_region = None;
        }

        let defaults = Settings::default();
        if !self.match_threshold.is_finite() || !(0.0..=1.0).contains(&self.match_threshold) {
            warn!(
                "match_threshold {} out of range, using default",
                self.match_threshold
            );
            self.match_threshold = defaults.match_threshold;
        }
        if !self.click_cooldown.is_finite() || self.click_cooldown <= 0.0 {
            warn!(
                "click_cooldown {} out of range, using default",
                self.click_cooldown
            );
            self.click_cooldown = defaults.click_cooldown;
        }
        if !self.check_interval.is_finite() || self.check_interval <= 0.0 {
            warn!(
                "check_interval {} out of range, using default",
                self.check_interval
            );
            self.check_interval = defaults.check_interval;
        }
        self
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.click_cooldown)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.check_interval)
    }

    /// The configured detection region for a mode; `None` means full screen.
    pub fn region_for(&self, mode: Mode) -> Option<Region> {
        match mode {
            Mode::Elemental => self.elemental_region,
            Mode::Physical => self.physical_region,
        }
    }

    pub fn set_region_for(&mut self, mode: Mode, region: Region) {
        match mode {
            Mode::Elemental => self.elemental_region = Some(region),
            Mode::Physical => self.physical_region = Some(region),
        }
    }
}

/// Load/save seam for the persisted configuration.
pub trait SettingsStore: Send {
    /// Loads settings, falling back to defaults on any error.
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> DetectorResult<()>;
}

/// Settings persisted as a JSON file on disk.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Settings {
        if !self.path.exists() {
            info!("no config at {}, using defaults", self.path.display());
            return Settings::default();
        }
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
                Ok(settings) => {
                    info!("config loaded from {}", self.path.display());
                    settings.normalized()
                }
                Err(e) => {
                    warn!(
                        "could not parse {}: {}. Using defaults.",
                        self.path.display(),
                        e
                    );
                    Settings::default()
                }
            },
            Err(e) => {
                warn!(
                    "could not read {}: {}. Using defaults.",
                    self.path.display(),
                    e
                );
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> DetectorResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
