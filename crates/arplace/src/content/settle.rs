//! Settle detection for detach-on-settle content.
//!
//! A [`SettleWatch`] is polled once per frame, after all transform updates of
//! that frame. It counts consecutive samples whose position is bit-identical
//! to the previous one and reports [`SettleStatus::Settled`] once the count
//! reaches the threshold. Cancelling a watch is dropping it.

use nalgebra::Point3;

/// Consecutive unchanged samples required before content counts as settled.
pub const DEFAULT_STABLE_FRAMES: u32 = 3;

/// Result of one [`SettleWatch::observe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStatus {
    /// Position changed since the previous sample.
    Moving,
    /// Position unchanged, threshold not reached yet.
    Steady {
        /// Consecutive unchanged samples so far.
        stable_frames: u32,
    },
    /// Threshold reached; the watch is spent.
    Settled,
}

/// Restartable, single-shot "has it stopped moving" watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct SettleWatch {
    last_position: Point3<f64>,
    stable_frames: u32,
    threshold: u32,
}

impl SettleWatch {
    /// Start watching from `initial`. A zero threshold is treated as one.
    pub fn new(initial: Point3<f64>, threshold: u32) -> Self {
        Self {
            last_position: initial,
            stable_frames: 0,
            threshold: threshold.max(1),
        }
    }

    /// Consecutive unchanged samples seen so far.
    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }

    /// Samples required to settle.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Feed the end-of-frame position.
    pub fn observe(&mut self, position: Point3<f64>) -> SettleStatus {
        if position == self.last_position {
            self.stable_frames += 1;
        } else {
            self.stable_frames = 0;
        }
        self.last_position = position;

        if self.stable_frames >= self.threshold {
            SettleStatus::Settled
        } else if self.stable_frames == 0 {
            SettleStatus::Moving
        } else {
            SettleStatus::Steady {
                stable_frames: self.stable_frames,
            }
        }
    }
}
