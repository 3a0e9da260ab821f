//! Countdown-driven calibration of the click point and detection regions.
//!
//! The operator hovers the mouse while a countdown runs, and the pointer
//! position is sampled when it reaches zero. The wait primitive is injected
//! so tests (and non-interactive surfaces) run the flows synchronously.

use std::time::Duration;

use crate::config::Region;
use crate::errors::DetectorResult;
use crate::input::InputDriver;

/// Default countdown length, matching the three-second hover window the
/// control surface advertises.
pub const DEFAULT_COUNTDOWN_SECS: u32 = 3;

fn countdown(
    secs: u32,
    sleep: &mut dyn FnMut(Duration),
    tick: &mut dyn FnMut(u32),
) {
    for remaining in (1..=secs).rev() {
        tick(remaining);
        sleep(Duration::from_secs(1));
    }
}

/// Counts down and then samples the pointer as the fixed click target.
///
/// `tick` receives the remaining seconds before each wait so the surface
/// can display "capturing in N...".
pub fn capture_click_point(
    input: &dyn InputDriver,
    secs: u32,
    mut sleep: impl FnMut(Duration),
    mut tick: impl FnMut(u32),
) -> DetectorResult<(i32, i32)> {
    countdown(secs, &mut sleep, &mut tick);
    input.cursor_position()
}

/// Two-step region calibration: one countdown per corner, top-left first.
///
/// The corners may be given in any order; they are normalized into a
/// rectangle. Coincident corners are rejected and the caller keeps its
/// previous region.
pub fn capture_region(
    input: &dyn InputDriver,
    secs: u32,
    mut sleep: impl FnMut(Duration),
    mut tick: impl FnMut(u32),
) -> DetectorResult<Region> {
    countdown(secs, &mut sleep, &mut tick);
    let first = input.cursor_position()?;
    countdown(secs, &mut sleep, &mut tick);
    let second = input.cursor_position()?;
    Region::from_corners(first, second)
}
