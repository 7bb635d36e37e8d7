//! Per-parameter loop recorder and player.
//!
//! A [`Loop`] owns a fixed-size buffer with one slot per clock pulse and a
//! four-state machine:
//!
//! ```text
//!            record on               record on
//!   Empty ─────────────▶ Recording   Playing ─────────────▶ Overdub
//!     ▲                     │           ▲ ▲                    │
//!     └── record off, ──────┤           │ └──── record off ────┘
//!         no take           └───────────┘
//!                          record off, take
//! ```
//!
//! The record flag is latched once at the start of every tick, so a change
//! written during a tick only takes effect on the next one.

use serde::{Deserialize, Serialize};

use crate::{
    signal::{Direction, SignalId, SignalOwner, SignalRange, SignalRegistry},
    EmptySlotPolicy, LoopConfig, LooperError, PulseClock, Result,
};

/// Record flag values at or above this threshold enable recording.
pub const RECORD_THRESHOLD: f32 = 0.5;

/// Position of a loop in its runtime, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(pub(crate) usize);

impl LoopId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The three named signals every loop exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Input,
    Output,
    RecordEnable,
}

impl Endpoint {
    pub const ALL: [Endpoint; 3] = [Endpoint::Input, Endpoint::Output, Endpoint::RecordEnable];

    /// Registry name of this endpoint for the loop called `loop_name`.
    pub fn signal_name(self, loop_name: &str) -> String {
        let suffix = match self {
            Endpoint::Input => "input",
            Endpoint::Output => "output",
            Endpoint::RecordEnable => "record",
        };
        format!("{loop_name}/{suffix}")
    }

    pub fn direction(self) -> Direction {
        match self {
            Endpoint::Output => Direction::Out,
            Endpoint::Input | Endpoint::RecordEnable => Direction::In,
        }
    }
}

/// Registry handles of a loop's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopEndpoints {
    pub input: SignalId,
    pub output: SignalId,
    pub record: SignalId,
}

impl LoopEndpoints {
    pub fn get(&self, endpoint: Endpoint) -> SignalId {
        match endpoint {
            Endpoint::Input => self.input,
            Endpoint::Output => self.output,
            Endpoint::RecordEnable => self.record,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    #[default]
    Empty,
    Recording,
    Playing,
    Overdub,
}

#[derive(Debug)]
pub struct Loop {
    id: LoopId,
    config: LoopConfig,
    clock: PulseClock,
    buffer: Vec<Option<f32>>,
    state: LoopState,
    empty_slot: EmptySlotPolicy,
    endpoints: LoopEndpoints,
    input: f32,
    record_requested: bool,
    record_latched: bool,
    held: f32,
    cycles: u64,
}

impl Loop {
    /// Validates `config` and registers the loop's three endpoints. Nothing is
    /// registered when construction fails.
    pub fn new(
        id: LoopId,
        config: LoopConfig,
        empty_slot: EmptySlotPolicy,
        registry: &mut SignalRegistry,
    ) -> Result<Self> {
        let clock = PulseClock::new(&config)?;

        for endpoint in Endpoint::ALL {
            let name = endpoint.signal_name(&config.name);
            if registry.lookup(&name).is_ok() {
                return Err(LooperError::DuplicateName { name });
            }
        }

        let mut register = |endpoint: Endpoint| {
            registry.create(
                &endpoint.signal_name(&config.name),
                endpoint.direction(),
                SignalRange::UNIT,
                SignalOwner::Loop { id, endpoint },
            )
        };
        let endpoints = LoopEndpoints {
            input: register(Endpoint::Input)?,
            output: register(Endpoint::Output)?,
            record: register(Endpoint::RecordEnable)?,
        };

        tracing::info!(
            name = %config.name,
            pulses = clock.total_pulses(),
            ppqn = clock.pulses_per_quarter_note(),
            "loop created"
        );

        Ok(Self {
            id,
            buffer: vec![None; clock.total_pulses()],
            clock,
            config,
            state: LoopState::Empty,
            empty_slot,
            endpoints,
            input: 0.0,
            record_requested: false,
            record_latched: false,
            held: 0.0,
            cycles: 0,
        })
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn endpoints(&self) -> LoopEndpoints {
        self.endpoints
    }

    pub fn phase(&self) -> usize {
        self.clock.phase()
    }

    pub fn total_pulses(&self) -> usize {
        self.clock.total_pulses()
    }

    /// Completed passes through the buffer.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn slots(&self) -> &[Option<f32>] {
        &self.buffer
    }

    pub fn has_take(&self) -> bool {
        self.buffer.iter().any(Option::is_some)
    }

    /// Record flag as last written, which may not be latched yet.
    pub fn record_requested(&self) -> bool {
        self.record_requested
    }

    pub fn input(&self) -> f32 {
        self.input
    }

    /// Receives a value written to one of this loop's endpoints.
    pub fn update(&mut self, endpoint: Endpoint, value: f32) {
        match endpoint {
            Endpoint::Input => self.input = value,
            Endpoint::RecordEnable => self.record_requested = value >= RECORD_THRESHOLD,
            // Owned by the loop; external writes only reach the registry.
            Endpoint::Output => {}
        }
    }

    /// Samples the record flag for the coming tick.
    pub fn latch_record_enable(&mut self) {
        self.record_latched = self.record_requested;
    }

    /// Runs one tick at the current pulse, then advances the clock. Returns the
    /// value to push through the output endpoint, if the loop is playing.
    ///
    /// The clock moves after the action, so a fresh loop acts on pulse 0.
    pub fn step(&mut self) -> Option<f32> {
        self.transition();

        let pulse = self.clock.phase();
        let emitted = match self.state {
            LoopState::Empty => None,
            LoopState::Recording => {
                self.write(pulse);
                self.held = self.input;
                None
            }
            LoopState::Playing => Some(self.read(pulse)),
            LoopState::Overdub => {
                let played = self.read(pulse);
                self.write(pulse);
                Some(played)
            }
        };

        if self.clock.advance() {
            self.cycles += 1;
            tracing::trace!(name = %self.config.name, cycles = self.cycles, "loop boundary");
        }
        emitted
    }

    /// Discards the take and returns to [`LoopState::Empty`].
    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.held = 0.0;
        self.set_state(LoopState::Empty);
    }

    /// Rebuilds buffer and clock for a new length and resolution. The take is
    /// discarded; endpoint handles and the record flag survive.
    pub fn reconfigure(&mut self, length_beats: f32, pulses_per_quarter_note: u32) -> Result<()> {
        let config = LoopConfig {
            length_beats,
            pulses_per_quarter_note,
            ..self.config.clone()
        };
        let clock = PulseClock::new(&config)?;

        self.buffer = vec![None; clock.total_pulses()];
        self.clock = clock;
        self.config = config;
        self.cycles = 0;
        self.clear();
        tracing::info!(
            name = %self.config.name,
            pulses = self.clock.total_pulses(),
            "loop reconfigured"
        );
        Ok(())
    }

    fn transition(&mut self) {
        let next = match (self.state, self.record_latched) {
            (LoopState::Empty, true) => LoopState::Recording,
            (LoopState::Recording, false) if self.has_take() => LoopState::Playing,
            (LoopState::Recording, false) => LoopState::Empty,
            (LoopState::Playing, true) => LoopState::Overdub,
            (LoopState::Overdub, false) => LoopState::Playing,
            (state, _) => state,
        };
        self.set_state(next);
    }

    fn set_state(&mut self, next: LoopState) {
        if next != self.state {
            tracing::debug!(
                name = %self.config.name,
                from = ?self.state,
                to = ?next,
                "loop state changed"
            );
            self.state = next;
        }
    }

    fn write(&mut self, pulse: usize) {
        let len = self.buffer.len();
        self.buffer[pulse % len] = Some(self.input);
    }

    fn read(&mut self, pulse: usize) -> f32 {
        let len = self.buffer.len();
        let value = match (self.buffer[pulse % len], self.empty_slot) {
            (Some(value), _) => value,
            (None, EmptySlotPolicy::Hold) => self.held,
            (None, EmptySlotPolicy::Zero) => 0.0,
        };
        self.held = value;
        value
    }
}
