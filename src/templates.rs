//! Reference glyph templates for matching.
//!
//! Loads the known template images at startup, converts them to grayscale,
//! and exposes them per mode as priority-ordered lists. Missing or
//! unreadable files are skipped with a warning; the detector then degrades
//! to OCR-only operation (or no detection at all).

use std::fmt;
use std::path::{Path, PathBuf};

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Target glyph values the detector recognizes.
///
/// Serialized as the digit itself so config files stay readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Glyph {
    Four,
    Five,
    Six,
}

impl Glyph {
    /// All glyphs in descending match priority. A detection of an earlier
    /// entry suppresses evaluation of the later ones within a cycle.
    pub const PRIORITY: [Glyph; 3] = [Glyph::Six, Glyph::Five, Glyph::Four];

    /// The digit this glyph renders as.
    pub fn value(self) -> u8 {
        match self {
            Glyph::Four => 4,
            Glyph::Five => 5,
            Glyph::Six => 6,
        }
    }

    /// Maps an OCR character back to a glyph, if it is one of the targets.
    pub fn from_digit(c: char) -> Option<Glyph> {
        match c {
            '4' => Some(Glyph::Four),
            '5' => Some(Glyph::Five),
            '6' => Some(Glyph::Six),
            _ => None,
        }
    }
}

impl From<Glyph> for u8 {
    fn from(glyph: Glyph) -> u8 {
        glyph.value()
    }
}

impl TryFrom<u8> for Glyph {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Glyph::Four),
            5 => Ok(Glyph::Five),
            6 => Ok(Glyph::Six),
            other => Err(format!("unknown glyph value {other}")),
        }
    }
}

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Detection mode. Each mode has its own template set and screen region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Elemental,
    Physical,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Elemental => write!(f, "elemental"),
            Mode::Physical => write!(f, "physical"),
        }
    }
}

/// A single loaded reference image.
#[derive(Clone, Debug)]
pub struct Template {
    /// Source file name, kept for log messages.
    pub name: String,
    pub image: GrayImage,
}

impl Template {
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

/// The fixed, known set of template files under an asset root.
///
/// Several rendered variants exist per glyph; they are listed in the order
/// they should be tried.
pub struct TemplateCatalog {
    root: PathBuf,
}

impl TemplateCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn files(mode: Mode, glyph: Glyph) -> &'static [&'static str] {
        match (mode, glyph) {
            (Mode::Elemental, Glyph::Six) => &["elemental/six.png"],
            (Mode::Elemental, Glyph::Five) => &["elemental/five.png", "elemental/five_alt.png"],
            (Mode::Elemental, Glyph::Four) => &[
                "elemental/four.png",
                "elemental/four_alt.png",
                "elemental/four_small.png",
            ],
            (Mode::Physical, Glyph::Six) => &["physical/six.png"],
            (Mode::Physical, Glyph::Five) => &["physical/five.png", "physical/five_alt.png"],
            (Mode::Physical, Glyph::Four) => &["physical/four.png", "physical/four_alt.png"],
        }
    }

    /// Absolute paths for one (mode, glyph) group.
    pub fn paths(&self, mode: Mode, glyph: Glyph) -> Vec<PathBuf> {
        Self::files(mode, glyph)
            .iter()
            .map(|f| self.root.join(f))
            .collect()
    }
}

/// All loaded templates, grouped per mode into priority-ordered class lists.
pub struct TemplateStore {
    elemental: Vec<(Glyph, Vec<Template>)>,
    physical: Vec<(Glyph, Vec<Template>)>,
}

impl TemplateStore {
    /// Loads every catalog entry that exists on disk.
    ///
    /// Never fails: unreadable files are logged and skipped, and an empty
    /// store is valid (the detection loop then relies on OCR alone).
    pub fn load(catalog: &TemplateCatalog) -> Self {
        let store = Self {
            elemental: load_mode(catalog, Mode::Elemental),
            physical: load_mode(catalog, Mode::Physical),
        };

        let total = store.len(Mode::Elemental) + store.len(Mode::Physical);
        if total == 0 {
            warn!("no template images loaded; falling back to OCR-only detection");
        } else {
            info!(
                "loaded {} templates ({} elemental, {} physical)",
                total,
                store.len(Mode::Elemental),
                store.len(Mode::Physical)
            );
        }
        store
    }

    /// Builds a store from already-loaded class lists. Lists are expected
    /// in descending priority order, as produced by [`Glyph::PRIORITY`].
    pub fn from_classes(
        elemental: Vec<(Glyph, Vec<Template>)>,
        physical: Vec<(Glyph, Vec<Template>)>,
    ) -> Self {
        Self {
            elemental,
            physical,
        }
    }

    /// Priority-ordered `(glyph, templates)` pairs for a mode.
    pub fn classes(&self, mode: Mode) -> &[(Glyph, Vec<Template>)] {
        match mode {
            Mode::Elemental => &self.elemental,
            Mode::Physical => &self.physical,
        }
    }

    /// Number of templates loaded for a mode.
    pub fn len(&self, mode: Mode) -> usize {
        self.classes(mode).iter().map(|(_, t)| t.len()).sum()
    }

    pub fn is_empty(&self, mode: Mode) -> bool {
        self.len(mode) == 0
    }
}

fn load_mode(catalog: &TemplateCatalog, mode: Mode) -> Vec<(Glyph, Vec<Template>)> {
    Glyph::PRIORITY
        .iter()
        .map(|&glyph| {
            let templates = catalog
                .paths(mode, glyph)
                .iter()
                .filter_map(|path| load_template(path))
                .collect::<Vec<_>>();
            (glyph, templates)
        })
        .collect()
}

fn load_template(path: &Path) -> Option<Template> {
    if !path.exists() {
        warn!("template image not found, skipping: {}", path.display());
        return None;
    }
    match image::open(path) {
        Ok(img) => {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Some(Template::new(name, img.to_luma8()))
        }
        Err(e) => {
            warn!("could not read template {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    fn checkerboard(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]))
    }

    #[test]
    fn test_priority_order() {
        assert_eq!(Glyph::PRIORITY, [Glyph::Six, Glyph::Five, Glyph::Four]);
    }

    #[test]
    fn test_glyph_digit_round_trip() {
        for glyph in Glyph::PRIORITY {
            let digit = char::from(b'0' + glyph.value());
            assert_eq!(Glyph::from_digit(digit), Some(glyph));
        }
        assert_eq!(Glyph::from_digit('7'), None);
    }

    #[test]
    fn test_load_skips_missing_files() {
        let dir = tempdir().unwrap();
        let catalog = TemplateCatalog::new(dir.path());

        // Only one of the catalog files exists.
        std::fs::create_dir_all(dir.path().join("elemental")).unwrap();
        checkerboard(8, 8)
            .save(dir.path().join("elemental/five.png"))
            .unwrap();

        let store = TemplateStore::load(&catalog);
        assert_eq!(store.len(Mode::Elemental), 1);
        assert_eq!(store.len(Mode::Physical), 0);
        assert!(store.is_empty(Mode::Physical));

        // The loaded template landed in its priority slot.
        let classes = store.classes(Mode::Elemental);
        assert_eq!(classes[0].0, Glyph::Six);
        assert!(classes[0].1.is_empty());
        assert_eq!(classes[1].0, Glyph::Five);
        assert_eq!(classes[1].1.len(), 1);
        assert_eq!(classes[1].1[0].name, "five");
    }

    #[test]
    fn test_load_skips_corrupt_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("elemental")).unwrap();
        std::fs::write(dir.path().join("elemental/six.png"), b"not a png").unwrap();

        let store = TemplateStore::load(&TemplateCatalog::new(dir.path()));
        assert_eq!(store.len(Mode::Elemental), 0);
    }

    #[test]
    fn test_templates_are_grayscale() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("physical")).unwrap();
        // Save a colored RGB image; the store must convert it.
        let rgb = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 30]));
        rgb.save(dir.path().join("physical/four.png")).unwrap();

        let store = TemplateStore::load(&TemplateCatalog::new(dir.path()));
        let classes = store.classes(Mode::Physical);
        let four = &classes[2].1[0];
        assert_eq!(four.image.dimensions(), (4, 4));
    }
}
