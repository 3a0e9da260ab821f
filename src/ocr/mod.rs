//! OCR fallback for glyphs template matching missed.
//!
//! Only consulted when the matcher reports no detection. The engine itself
//! is a collaborator behind [`DigitReader`]; [`fallback`] owns the candidate
//! region scan.

pub mod engine;
pub mod fallback;

pub use engine::{DigitReader, TesseractReader};
pub use fallback::scan_candidates;
