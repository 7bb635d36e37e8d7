use crate::{LoopConfig, Result};

/// Free-running pulse counter that wraps at the length of one loop cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseClock {
    pulses_per_quarter_note: u32,
    total_pulses: usize,
    current_pulse: usize,
}

impl PulseClock {
    /// Builds a clock for `config`, failing with
    /// [`crate::LooperError::InvalidConstruction`] on a non-positive length or PPQN.
    pub fn new(config: &LoopConfig) -> Result<Self> {
        Ok(Self {
            pulses_per_quarter_note: config.pulses_per_quarter_note,
            total_pulses: config.total_pulses()?,
            current_pulse: 0,
        })
    }

    pub fn reset(&mut self) {
        self.current_pulse = 0;
    }

    /// Moves forward one pulse. Returns `true` when the clock wrapped back to
    /// pulse zero, i.e. a loop boundary was crossed.
    pub fn advance(&mut self) -> bool {
        self.current_pulse += 1;
        if self.current_pulse >= self.total_pulses {
            self.current_pulse = 0;
            true
        } else {
            false
        }
    }

    pub fn phase(&self) -> usize {
        self.current_pulse
    }

    pub fn total_pulses(&self) -> usize {
        self.total_pulses
    }

    pub fn pulses_per_quarter_note(&self) -> u32 {
        self.pulses_per_quarter_note
    }

    /// Position within the cycle in beats.
    pub fn beat_position(&self) -> f32 {
        self.current_pulse as f32 / self.pulses_per_quarter_note as f32
    }
}
