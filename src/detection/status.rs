//! Status events posted from the detection thread to the control surface.
//!
//! The detection thread never touches control-surface state directly. It
//! posts these updates over an mpsc channel and the surface applies them on
//! its own thread whenever it drains the receiver.

use std::sync::mpsc::{Receiver, Sender, channel};

use crate::templates::{Glyph, Mode};

/// A deferred status update for the control surface.
#[derive(Clone, Debug)]
pub enum StatusUpdate {
    Started(Mode),
    Paused(Mode),
    Resumed(Mode),
    Stopped(Mode),
    /// A detection passed the cooldown gate and a click was issued.
    Clicked {
        mode: Mode,
        glyph: Glyph,
        confidence: f32,
        /// Per-run click counter, 1-based.
        count: u64,
        x: i32,
        y: i32,
    },
    /// A single cycle failed and was skipped; the loop keeps running.
    CycleFailed(String),
}

/// Creates the status channel. The sender side is cloned into the detection
/// thread; the receiver belongs to the control surface.
pub fn status_channel() -> (Sender<StatusUpdate>, Receiver<StatusUpdate>) {
    channel()
}
