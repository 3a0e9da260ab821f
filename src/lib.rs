//! Attack-number glyph detector.
//!
//! Watches the screen (or a configured sub-region) for known attack-number
//! glyphs by template matching, with an OCR fallback, and issues a mouse
//! click when one is found above the configured confidence threshold. Two
//! detection modes exist (elemental and physical), each with its own
//! template set and optional detection region; at most one runs at a time.
//!
//! The operating system seams are traits the host wires in:
//! [`capture::ScreenSource`], [`input::InputDriver`], [`ocr::DigitReader`]
//! and [`config::SettingsStore`]. Real implementations for the desktop
//! (xcap, enigo, a tesseract binary, a JSON config file) ship behind the
//! `desktop` feature; everything else is plain library code a control
//! surface drives through [`detection::DetectorController`].

pub mod calibration;
pub mod capture;
pub mod config;
pub mod detection;
pub mod errors;
pub mod input;
pub mod matcher;
pub mod ocr;
pub mod templates;

pub use config::{FeedbackRecord, JsonSettingsStore, Region, Settings, SettingsStore, Verdict};
pub use detection::{DetectorController, PendingDetection, RunState, StatusUpdate};
pub use errors::{DetectorError, DetectorResult};
pub use matcher::Detection;
pub use templates::{Glyph, Mode, TemplateCatalog, TemplateStore};
