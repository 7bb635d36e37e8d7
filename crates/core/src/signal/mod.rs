//! Process-scoped catalogue of named signals.
//!
//! Every loop endpoint, synthesis parameter and external producer is a
//! [`Signal`] in a [`SignalRegistry`]. Signals are created once and never
//! renamed. The registry owns values only; propagation between signals is the
//! job of the [`crate::Router`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    looper::{Endpoint, LoopId},
    LooperError, RangePolicy, Result,
};

/// Opaque handle to a registered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalId(usize);

impl SignalId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Consumes values: loop inputs, record flags, synthesis parameters.
    In,
    /// Produces values: loop outputs, sensors, remote producers.
    Out,
}

/// Declared numeric range of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRange {
    pub min: f32,
    pub max: f32,
}

impl Default for SignalRange {
    fn default() -> Self {
        Self::UNIT
    }
}

impl SignalRange {
    pub const UNIT: SignalRange = SignalRange { min: 0.0, max: 1.0 };

    /// Builds a range, rejecting non-finite bounds or width and `min > max`.
    /// Zero-width ranges are allowed.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max || !(max - min).is_finite() {
            return Err(LooperError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Who receives updates written to a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOwner {
    /// One of the three endpoints of a loop.
    Loop { id: LoopId, endpoint: Endpoint },
    /// A named parameter of the synthesis host.
    Parameter { param: String },
    /// Owned outside the core: sensors, remote peers. Only the value is kept.
    External,
}

#[derive(Debug, Clone)]
pub struct Signal {
    name: String,
    direction: Direction,
    range: SignalRange,
    value: f32,
    owner: SignalOwner,
}

impl Signal {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn range(&self) -> SignalRange {
        self.range
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn owner(&self) -> &SignalOwner {
        &self.owner
    }
}

/// Serialisable view of a signal, used to mirror the registry externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub id: SignalId,
    pub name: String,
    pub direction: Direction,
    pub range: SignalRange,
    pub value: f32,
}

#[derive(Debug)]
pub struct SignalRegistry {
    signals: Vec<Signal>,
    by_name: HashMap<String, SignalId>,
    policy: RangePolicy,
    active: bool,
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::init(RangePolicy::default())
    }
}

impl SignalRegistry {
    /// Opens a registry that applies `policy` to out-of-range writes.
    pub fn init(policy: RangePolicy) -> Self {
        tracing::info!(?policy, "signal registry initialised");
        Self {
            signals: Vec::new(),
            by_name: HashMap::new(),
            policy,
            active: true,
        }
    }

    /// Drops every signal. Later calls fail with [`LooperError::RegistryShutdown`].
    pub fn shutdown(&mut self) {
        if !self.active {
            return;
        }
        tracing::info!(signals = self.signals.len(), "signal registry shut down");
        self.signals.clear();
        self.by_name.clear();
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn policy(&self) -> RangePolicy {
        self.policy
    }

    /// Registers a new signal. Its initial value is the lower bound of its range.
    pub fn create(
        &mut self,
        name: &str,
        direction: Direction,
        range: SignalRange,
        owner: SignalOwner,
    ) -> Result<SignalId> {
        self.ensure_active()?;
        if self.by_name.contains_key(name) {
            return Err(LooperError::DuplicateName {
                name: name.to_string(),
            });
        }
        // Ranges built by struct literal bypass `SignalRange::new`.
        let range = SignalRange::new(range.min, range.max)?;

        let id = SignalId(self.signals.len());
        self.signals.push(Signal {
            name: name.to_string(),
            direction,
            range,
            value: range.min,
            owner,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Stores `value` according to the registry's [`RangePolicy`] and returns
    /// the value actually stored. Non-finite values are rejected.
    pub fn set_value(&mut self, id: SignalId, value: f32) -> Result<f32> {
        let policy = self.policy;
        let signal = self.get_mut(id)?;
        if !value.is_finite() {
            return Err(LooperError::NonFiniteValue {
                signal: signal.name.clone(),
                value,
            });
        }

        let stored = match policy {
            RangePolicy::PassThrough => value,
            RangePolicy::Clamp => signal.range.clamp(value),
        };
        signal.value = stored;
        Ok(stored)
    }

    /// Stores a value produced inside the core (loop output, route result)
    /// without applying the range policy.
    pub(crate) fn store(&mut self, id: SignalId, value: f32) -> Result<()> {
        self.get_mut(id)?.value = value;
        Ok(())
    }

    pub fn get(&self, id: SignalId) -> Result<&Signal> {
        self.ensure_active()?;
        self.signals
            .get(id.0)
            .ok_or(LooperError::UnknownSignal(id))
    }

    fn get_mut(&mut self, id: SignalId) -> Result<&mut Signal> {
        self.ensure_active()?;
        self.signals
            .get_mut(id.0)
            .ok_or(LooperError::UnknownSignal(id))
    }

    pub fn value(&self, id: SignalId) -> Result<f32> {
        Ok(self.get(id)?.value)
    }

    pub fn lookup(&self, name: &str) -> Result<SignalId> {
        self.ensure_active()?;
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| LooperError::UnknownSignalName(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &Signal)> {
        self.signals
            .iter()
            .enumerate()
            .map(|(index, signal)| (SignalId(index), signal))
    }

    pub fn snapshot(&self) -> Vec<SignalInfo> {
        self.iter()
            .map(|(id, signal)| SignalInfo {
                id,
                name: signal.name.clone(),
                direction: signal.direction,
                range: signal.range,
                value: signal.value,
            })
            .collect()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(LooperError::RegistryShutdown)
        }
    }
}
