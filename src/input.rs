//! Mouse primitives.
//!
//! Clicking and cursor-position reads go through [`InputDriver`] so the
//! detection loop and the calibration flows never touch OS input APIs
//! directly.

use crate::errors::DetectorResult;

/// Mouse access offered by the host environment.
pub trait InputDriver: Send + Sync {
    /// Issues a single left click at the given absolute screen position.
    fn click(&self, x: i32, y: i32) -> DetectorResult<()>;

    /// Current pointer position in absolute screen coordinates.
    fn cursor_position(&self) -> DetectorResult<(i32, i32)>;
}

/// Real mouse driver backed by `enigo`.
#[cfg(feature = "desktop")]
pub struct EnigoInput {
    enigo: std::sync::Mutex<enigo::Enigo>,
}

#[cfg(feature = "desktop")]
impl EnigoInput {
    pub fn new() -> DetectorResult<Self> {
        use crate::errors::DetectorError;

        let enigo = enigo::Enigo::new(&enigo::Settings::default())
            .map_err(|e| DetectorError::Input(e.to_string()))?;
        Ok(Self {
            enigo: std::sync::Mutex::new(enigo),
        })
    }
}

#[cfg(feature = "desktop")]
impl InputDriver for EnigoInput {
    fn click(&self, x: i32, y: i32) -> DetectorResult<()> {
        use crate::errors::DetectorError;
        use enigo::{Button, Coordinate, Direction, Mouse};

        let mut enigo = self
            .enigo
            .lock()
            .map_err(|_| DetectorError::Input("input driver lock poisoned".into()))?;
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| DetectorError::Input(e.to_string()))?;
        enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| DetectorError::Input(e.to_string()))?;
        Ok(())
    }

    fn cursor_position(&self) -> DetectorResult<(i32, i32)> {
        use crate::errors::DetectorError;
        use enigo::Mouse;

        let enigo = self
            .enigo
            .lock()
            .map_err(|_| DetectorError::Input("input driver lock poisoned".into()))?;
        enigo
            .location()
            .map_err(|e| DetectorError::Input(e.to_string()))
    }
}
