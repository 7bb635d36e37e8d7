use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{router::Mapping, LooperError, Result};

/// Upper bound on the number of slots a single loop may allocate.
pub const MAX_TOTAL_PULSES: usize = 1 << 20;

/// Construction-time options of a single loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub name: String,
    pub length_beats: f32,
    pub pulses_per_quarter_note: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            length_beats: 1.0,
            pulses_per_quarter_note: 48,
        }
    }
}

impl LoopConfig {
    pub fn new(name: impl Into<String>, length_beats: f32, pulses_per_quarter_note: u32) -> Self {
        Self {
            name: name.into(),
            length_beats,
            pulses_per_quarter_note,
        }
    }

    /// Number of pulses in one cycle of the loop, rounded to the nearest
    /// whole pulse.
    pub fn total_pulses(&self) -> Result<usize> {
        if self.name.is_empty() {
            return Err(LooperError::construction("loop name must not be empty"));
        }
        if self.pulses_per_quarter_note == 0 {
            return Err(LooperError::construction(format!(
                "loop `{}` needs a positive PPQN",
                self.name
            )));
        }
        if !self.length_beats.is_finite() || self.length_beats <= 0.0 {
            return Err(LooperError::construction(format!(
                "loop `{}` needs a positive length, got {} beats",
                self.name, self.length_beats
            )));
        }

        let pulses = (self.length_beats as f64 * self.pulses_per_quarter_note as f64).round();
        if pulses < 1.0 {
            return Err(LooperError::construction(format!(
                "loop `{}` is shorter than one pulse",
                self.name
            )));
        }
        if pulses > MAX_TOTAL_PULSES as f64 {
            return Err(LooperError::construction(format!(
                "loop `{}` needs {pulses} pulses, more than the limit of {MAX_TOTAL_PULSES}",
                self.name
            )));
        }
        Ok(pulses as usize)
    }
}

/// What a playing loop emits when it reaches a slot that was never written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySlotPolicy {
    /// Keep emitting the previously played value.
    #[default]
    Hold,
    /// Emit zero.
    Zero,
}

/// How [`crate::SignalRegistry::set_value`] treats values outside the declared
/// range of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Store the value as written. The range is informational only.
    #[default]
    PassThrough,
    /// Clamp the value into the declared range before storing it.
    Clamp,
}

/// Options shared by every loop and signal of a runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub empty_slot: EmptySlotPolicy,
    pub range_policy: RangePolicy,
}

/// Describes a synthesis parameter exposed as an input signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Registry name of the signal, e.g. `faust/cutoffFrequency`.
    pub signal: String,
    /// Parameter identifier understood by the synthesis host.
    pub param: String,
    pub min: f32,
    pub max: f32,
}

impl ParameterConfig {
    pub fn new(signal: impl Into<String>, param: impl Into<String>, min: f32, max: f32) -> Self {
        Self {
            signal: signal.into(),
            param: param.into(),
            min,
            max,
        }
    }
}

/// Describes a route between two signals, addressed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub mapping: Mapping,
}

impl RouteConfig {
    pub fn linear(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            mapping: Mapping::Linear,
        }
    }
}

/// Top-level description of a looping session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub loops: Vec<LoopConfig>,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Three one-beat loops at 48 PPQN driving the gain, cutoff and
    /// resonance of a filtered synth voice.
    pub fn demo() -> Self {
        let voices = [
            ("gainLoop", "faust/gain", "gain", 0.0, 1.0),
            ("cutoffLoop", "faust/cutoffFrequency", "cutoffFrequency", 50.0, 3000.0),
            ("resonanceLoop", "faust/resonance", "resonance", 0.0, 1.0),
        ];

        let mut config = Self::default();
        for (loop_name, signal, param, min, max) in voices {
            config.loops.push(LoopConfig::new(loop_name, 1.0, 48));
            config
                .parameters
                .push(ParameterConfig::new(signal, param, min, max));
            config
                .routes
                .push(RouteConfig::linear(format!("{loop_name}/output"), signal));
        }
        config
    }
}
