//! Core library for MapLooper.
//!
//! MapLooper records live control signals (knobs, sensors, random sources)
//! into short pulse-clocked loops and plays them back into synthesis
//! parameters. The crate is split into the loop recorder/player
//! ([`looper`], [`clock`]) and the signal-mapping runtime ([`signal`],
//! [`router`], [`runtime`]). The synthesis engine sits behind
//! [`ParameterHost`]; producers on other threads hand values over through
//! [`UpdateQueue`].

pub mod clock;
pub mod config;
pub mod error;
pub mod host;
pub mod looper;
pub mod queue;
pub mod router;
pub mod runtime;
pub mod signal;

pub use clock::PulseClock;
pub use config::{
    EmptySlotPolicy, LoopConfig, ParameterConfig, RangePolicy, RouteConfig, RuntimeConfig,
    SessionConfig,
};
pub use error::{LooperError, Result};
pub use host::{NullHost, ParameterBank, ParameterHost};
pub use looper::{Endpoint, Loop, LoopEndpoints, LoopId, LoopState};
pub use queue::{SignalUpdate, UpdateQueue, UpdateSender};
pub use router::{linear_remap, Mapping, Route, Router, Transform};
pub use runtime::Runtime;
pub use signal::{
    Direction, Signal, SignalId, SignalInfo, SignalOwner, SignalRange, SignalRegistry,
};
