//! CaptureWindow - the immutable tick range kept as the final dataset.

use contracts::SimTick;

/// A contiguous half-open range of ticks `[start_frame, start_frame + len)`.
///
/// Computed once after both warm-up and take phases complete, from the last
/// tick observed in the take phase: the capture side steps
/// `frames_to_take + margin` ticks, so the window starts at the first
/// take-phase tick and the trailing `margin` ticks are slack for callbacks
/// still in flight. Immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    start_frame: SimTick,
    len: u64,
}

impl CaptureWindow {
    /// Establish the window from the last observed take-phase tick.
    ///
    /// Returns None when `last_tick` is too small to hold the full take
    /// phase, which would mean the clock ran backwards.
    pub fn from_last_tick(last_tick: SimTick, frames_to_take: u64, margin: u64) -> Option<Self> {
        let span = frames_to_take + margin;
        let start_frame = (last_tick + 1).checked_sub(span)?;
        Some(Self {
            start_frame,
            len: frames_to_take,
        })
    }

    /// First tick of the window
    pub fn start_frame(&self) -> SimTick {
        self.start_frame
    }

    /// Number of ticks in the window
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True for a zero-length window
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last tick of the window
    pub fn end(&self) -> SimTick {
        self.start_frame + self.len
    }

    /// Whether a tick falls inside the window
    pub fn contains(&self, tick: SimTick) -> bool {
        tick >= self.start_frame && tick < self.end()
    }

    /// Zero-based offset of a tick within the window
    pub fn offset_of(&self, tick: SimTick) -> Option<u64> {
        self.contains(tick).then(|| tick - self.start_frame)
    }

    /// Iterate the window's ticks in order
    pub fn ticks(&self) -> impl Iterator<Item = SimTick> {
        self.start_frame..self.end()
    }
}
