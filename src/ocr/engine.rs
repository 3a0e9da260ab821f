//! Digit recognition backed by a Tesseract executable.
//!
//! The image is written to a temporary PNG and Tesseract is invoked in
//! single-character mode with a digit whitelist, the same pipeline the
//! upstream tool used. A missing installation surfaces once at
//! construction; the caller then runs without OCR.

use std::path::PathBuf;
use std::process::Command;

use image::GrayImage;
use tempfile::NamedTempFile;

use crate::errors::{DetectorError, DetectorResult};

/// Single-character digit OCR offered by the host environment.
pub trait DigitReader: Send + Sync {
    /// Recognizes digit characters in the image. The returned string may be
    /// empty and may contain stray non-target digits; callers filter it.
    fn read_digits(&self, image: &GrayImage) -> DetectorResult<String>;
}

/// [`DigitReader`] that shells out to a `tesseract` binary.
pub struct TesseractReader {
    program: PathBuf,
}

impl TesseractReader {
    /// Probes `tesseract` on PATH.
    pub fn new() -> DetectorResult<Self> {
        Self::with_program("tesseract")
    }

    /// Uses a specific executable, verifying it runs.
    pub fn with_program(program: impl Into<PathBuf>) -> DetectorResult<Self> {
        let program = program.into();
        let probe = Command::new(&program)
            .arg("--version")
            .output()
            .map_err(|e| {
                DetectorError::Ocr(format!("could not run {}: {}", program.display(), e))
            })?;
        if !probe.status.success() {
            return Err(DetectorError::Ocr(format!(
                "{} exited with {}",
                program.display(),
                probe.status
            )));
        }
        Ok(Self { program })
    }
}

impl DigitReader for TesseractReader {
    fn read_digits(&self, image: &GrayImage) -> DetectorResult<String> {
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        // --psm 10: treat the image as a single character.
        let output = Command::new(&self.program)
            .arg(temp_input.path())
            .arg("stdout")
            .arg("--psm")
            .arg("10")
            .arg("-c")
            .arg("tessedit_char_whitelist=0123456789")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DetectorError::Ocr(format!("tesseract failed: {stderr}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
