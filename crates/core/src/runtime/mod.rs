//! Tick driver that owns every loop, the signal registry and the router.
//!
//! A tick runs on a single execution context and performs no blocking work.
//! Loops are stepped in registration order and each loop's output is routed
//! before the next loop runs.

use crate::{
    looper::{Loop, LoopEndpoints, LoopId},
    router::{Mapping, Route, Router},
    signal::{Direction, SignalId, SignalOwner, SignalRange, SignalRegistry},
    LoopConfig, LooperError, ParameterHost, Result, RuntimeConfig, SessionConfig, UpdateQueue,
};

#[derive(Debug)]
pub struct Runtime<H> {
    config: RuntimeConfig,
    registry: SignalRegistry,
    router: Router,
    loops: Vec<Loop>,
    host: H,
    ticks: u64,
}

impl<H: ParameterHost> Runtime<H> {
    pub fn new(config: RuntimeConfig, host: H) -> Self {
        Self {
            registry: SignalRegistry::init(config.range_policy),
            router: Router::new(),
            loops: Vec::new(),
            config,
            host,
            ticks: 0,
        }
    }

    /// Builds loops, parameter signals and routes described by `session`.
    pub fn from_session(session: &SessionConfig, host: H) -> Result<Self> {
        let mut runtime = Self::new(session.runtime.clone(), host);
        for config in &session.loops {
            runtime.create_loop(config.clone())?;
        }
        for parameter in &session.parameters {
            runtime.create_parameter(
                &parameter.signal,
                &parameter.param,
                SignalRange::new(parameter.min, parameter.max)?,
            )?;
        }
        for route in &session.routes {
            runtime.connect_by_name(&route.source, &route.destination, route.mapping)?;
        }
        Ok(runtime)
    }

    pub fn create_loop(&mut self, config: LoopConfig) -> Result<LoopId> {
        let id = LoopId(self.loops.len());
        let looper = Loop::new(id, config, self.config.empty_slot, &mut self.registry)?;
        self.loops.push(looper);
        Ok(id)
    }

    /// Exposes the host parameter `param` as the input signal `signal`.
    pub fn create_parameter(
        &mut self,
        signal: &str,
        param: &str,
        range: SignalRange,
    ) -> Result<SignalId> {
        self.registry.create(
            signal,
            Direction::In,
            range,
            SignalOwner::Parameter {
                param: param.to_string(),
            },
        )
    }

    /// Registers a signal owned outside the core, such as a sensor or a
    /// remote peer.
    pub fn create_signal(
        &mut self,
        name: &str,
        direction: Direction,
        range: SignalRange,
    ) -> Result<SignalId> {
        self.registry
            .create(name, direction, range, SignalOwner::External)
    }

    pub fn connect(&mut self, source: SignalId, destination: SignalId) -> Result<Option<Route>> {
        self.router.connect(&self.registry, source, destination)
    }

    pub fn connect_with(
        &mut self,
        source: SignalId,
        destination: SignalId,
        mapping: Mapping,
    ) -> Result<Option<Route>> {
        self.router
            .connect_with(&self.registry, source, destination, mapping)
    }

    pub fn connect_by_name(
        &mut self,
        source: &str,
        destination: &str,
        mapping: Mapping,
    ) -> Result<Option<Route>> {
        let source = self.registry.lookup(source)?;
        let destination = self.registry.lookup(destination)?;
        self.connect_with(source, destination, mapping)
    }

    pub fn disconnect(&mut self, destination: SignalId) -> Option<Route> {
        self.router.disconnect(destination)
    }

    /// Writes `value` to `signal`.
    ///
    /// Writes to an IN signal reach its owner directly. Writes to an OUT
    /// signal are pushed through every route it feeds.
    pub fn set_value(&mut self, signal: SignalId, value: f32) -> Result<()> {
        let stored = self.registry.set_value(signal, value)?;
        let direction = self.registry.get(signal)?.direction();
        match direction {
            Direction::In => {
                let Self {
                    registry,
                    loops,
                    host,
                    ..
                } = self;
                deliver(registry, loops, host, signal, stored)
            }
            Direction::Out => self.propagate(signal, stored),
        }
    }

    pub fn set_value_by_name(&mut self, name: &str, value: f32) -> Result<()> {
        let signal = self.registry.lookup(name)?;
        self.set_value(signal, value)
    }

    /// Convenience for writing a loop's RecordEnable endpoint.
    pub fn set_recording(&mut self, loop_name: &str, enabled: bool) -> Result<()> {
        let record = self.loop_endpoints(loop_name)?.record;
        self.set_value(record, if enabled { 1.0 } else { 0.0 })
    }

    /// Applies every queued update in arrival order and returns how many were
    /// applied. Rejected updates are logged and skipped.
    pub fn drain(&mut self, queue: &UpdateQueue) -> usize {
        let mut applied = 0;
        while let Some(update) = queue.try_recv() {
            match self.set_value(update.signal, update.value) {
                Ok(()) => applied += 1,
                Err(err) => tracing::warn!(signal = ?update.signal, %err, "dropped queued update"),
            }
        }
        applied
    }

    /// Advances every loop by one pulse.
    pub fn tick(&mut self) -> Result<()> {
        for looper in &mut self.loops {
            looper.latch_record_enable();
        }

        for index in 0..self.loops.len() {
            let looper = &mut self.loops[index];
            if let Some(value) = looper.step() {
                let output = looper.endpoints().output;
                self.registry.store(output, value)?;
                self.propagate(output, value)?;
            }
        }

        self.ticks += 1;
        Ok(())
    }

    pub fn clear_loop(&mut self, name: &str) -> Result<()> {
        self.loop_mut(name)?.clear();
        Ok(())
    }

    /// Rebuilds the named loop for a new length and resolution, discarding its take.
    pub fn reconfigure_loop(
        &mut self,
        name: &str,
        length_beats: f32,
        pulses_per_quarter_note: u32,
    ) -> Result<()> {
        self.loop_mut(name)?
            .reconfigure(length_beats, pulses_per_quarter_note)
    }

    pub fn loop_id(&self, name: &str) -> Result<LoopId> {
        Ok(self.loop_by_name(name)?.id())
    }

    pub fn loop_by_name(&self, name: &str) -> Result<&Loop> {
        self.loops
            .iter()
            .find(|looper| looper.name() == name)
            .ok_or_else(|| LooperError::UnknownLoop(name.to_string()))
    }

    pub fn loop_endpoints(&self, name: &str) -> Result<LoopEndpoints> {
        Ok(self.loop_by_name(name)?.endpoints())
    }

    pub fn get_loop(&self, id: LoopId) -> Option<&Loop> {
        self.loops.get(id.0)
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn registry(&self) -> &SignalRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Drops every loop and route and closes the registry.
    pub fn shutdown(&mut self) {
        tracing::info!(loops = self.loops.len(), ticks = self.ticks, "runtime shutting down");
        self.loops.clear();
        self.router.clear();
        self.registry.shutdown();
    }

    fn loop_mut(&mut self, name: &str) -> Result<&mut Loop> {
        self.loops
            .iter_mut()
            .find(|looper| looper.name() == name)
            .ok_or_else(|| LooperError::UnknownLoop(name.to_string()))
    }

    fn propagate(&mut self, source: SignalId, value: f32) -> Result<()> {
        let Self {
            registry,
            router,
            loops,
            host,
            ..
        } = self;
        for (destination, mapped) in router.on_source_changed(source, value) {
            registry.store(destination, mapped)?;
            deliver(registry, loops, host, destination, mapped)?;
        }
        Ok(())
    }
}

/// Hands `value` to whoever owns `signal`.
fn deliver<H: ParameterHost>(
    registry: &SignalRegistry,
    loops: &mut [Loop],
    host: &mut H,
    signal: SignalId,
    value: f32,
) -> Result<()> {
    match registry.get(signal)?.owner() {
        SignalOwner::Loop { id, endpoint } => {
            if let Some(looper) = loops.get_mut(id.index()) {
                looper.update(*endpoint, value);
            }
        }
        SignalOwner::Parameter { param } => host.set_param_value(param, value),
        SignalOwner::External => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Endpoint, LoopState, ParameterBank, RangePolicy};

    fn runtime() -> Runtime<ParameterBank> {
        Runtime::new(RuntimeConfig::default(), ParameterBank::new())
    }

    fn record_take(runtime: &mut Runtime<ParameterBank>, name: &str, values: &[f32]) {
        let input = runtime.loop_endpoints(name).unwrap().input;
        runtime.set_recording(name, true).unwrap();
        for value in values {
            runtime.set_value(input, *value).unwrap();
            runtime.tick().unwrap();
        }
        runtime.set_recording(name, false).unwrap();
    }

    #[test]
    fn loop_output_reaches_parameter_through_remap() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("cutoffLoop", 1.0, 2)).unwrap();
        let cutoff = runtime
            .create_parameter(
                "faust/cutoffFrequency",
                "cutoffFrequency",
                SignalRange::new(50.0, 3000.0).unwrap(),
            )
            .unwrap();
        let output = runtime.loop_endpoints("cutoffLoop").unwrap().output;
        runtime.connect(output, cutoff).unwrap();

        record_take(&mut runtime, "cutoffLoop", &[0.5, 1.0]);
        assert_eq!(runtime.host().get("cutoffFrequency"), None);

        runtime.tick().unwrap();
        assert_eq!(runtime.host().get("cutoffFrequency"), Some(1525.0));
        assert_eq!(runtime.registry().value(cutoff).unwrap(), 1525.0);
        assert_eq!(runtime.registry().value(output).unwrap(), 0.5);

        runtime.tick().unwrap();
        assert_eq!(runtime.host().get("cutoffFrequency"), Some(3000.0));
    }

    #[test]
    fn playing_loop_pushes_every_tick() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("gainLoop", 1.0, 1)).unwrap();
        runtime.create_parameter("faust/gain", "gain", SignalRange::UNIT).unwrap();
        runtime
            .connect_by_name("gainLoop/output", "faust/gain", Mapping::Linear)
            .unwrap();

        record_take(&mut runtime, "gainLoop", &[0.25]);
        for _ in 0..5 {
            runtime.tick().unwrap();
        }
        assert_eq!(runtime.host().updates(), 5);
        assert_eq!(runtime.host().get("gain"), Some(0.25));
    }

    #[test]
    fn last_connection_wins_at_destination() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("a", 1.0, 1)).unwrap();
        runtime.create_loop(LoopConfig::new("b", 1.0, 1)).unwrap();
        let gain = runtime.create_parameter("faust/gain", "gain", SignalRange::UNIT).unwrap();
        record_take(&mut runtime, "a", &[0.1]);
        record_take(&mut runtime, "b", &[0.9]);

        let a = runtime.loop_endpoints("a").unwrap().output;
        let b = runtime.loop_endpoints("b").unwrap().output;
        runtime.connect(a, gain).unwrap();
        let replaced = runtime.connect(b, gain).unwrap();
        assert_eq!(replaced.map(|route| route.source), Some(a));

        runtime.tick().unwrap();
        assert_eq!(runtime.host().get("gain"), Some(0.9));
        assert_eq!(runtime.host().updates(), 1);
    }

    #[test]
    fn record_flag_routed_mid_tick_applies_next_tick() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("trigger", 1.0, 1)).unwrap();
        runtime.create_loop(LoopConfig::new("follower", 1.0, 4)).unwrap();
        runtime
            .connect_by_name("trigger/output", "follower/record", Mapping::Linear)
            .unwrap();
        record_take(&mut runtime, "trigger", &[1.0]);

        runtime.tick().unwrap();
        let follower = runtime.loop_by_name("follower").unwrap();
        assert!(follower.record_requested());
        assert_eq!(follower.state(), LoopState::Empty);

        runtime.tick().unwrap();
        assert_eq!(
            runtime.loop_by_name("follower").unwrap().state(),
            LoopState::Recording
        );
    }

    #[test]
    fn loops_run_in_registration_order() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("source", 1.0, 1)).unwrap();
        runtime.create_loop(LoopConfig::new("copy", 1.0, 1)).unwrap();
        runtime
            .connect_by_name("source/output", "copy/input", Mapping::Linear)
            .unwrap();
        record_take(&mut runtime, "source", &[0.4]);

        runtime.set_recording("copy", true).unwrap();
        runtime.tick().unwrap();

        let copy = runtime.loop_by_name("copy").unwrap();
        assert_eq!(copy.slots(), &[Some(0.4)]);
    }

    #[test]
    fn external_source_routes_into_loop_input() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("loop", 1.0, 2)).unwrap();
        let sensor = runtime
            .create_signal("sensor/pressure", Direction::Out, SignalRange::new(0.0, 100.0).unwrap())
            .unwrap();
        runtime
            .connect_by_name("sensor/pressure", "loop/input", Mapping::Linear)
            .unwrap();

        runtime.set_value(sensor, 25.0).unwrap();
        let looper = runtime.loop_by_name("loop").unwrap();
        assert_eq!(looper.input(), 0.25);
    }

    #[test]
    fn non_finite_write_leaves_loops_untouched() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("a", 1.0, 2)).unwrap();
        runtime.create_loop(LoopConfig::new("b", 1.0, 2)).unwrap();
        record_take(&mut runtime, "b", &[0.3, 0.6]);

        let input = runtime.loop_endpoints("a").unwrap().input;
        runtime.set_value(input, 0.2).unwrap();
        let err = runtime.set_value(input, f32::NAN).unwrap_err();
        assert!(matches!(err, LooperError::NonFiniteValue { .. }));

        assert_eq!(runtime.loop_by_name("a").unwrap().input(), 0.2);
        assert_eq!(runtime.loop_by_name("b").unwrap().slots(), &[Some(0.3), Some(0.6)]);
    }

    #[test]
    fn oversized_loop_is_rejected_without_registering() {
        let mut runtime = runtime();
        let err = runtime
            .create_loop(LoopConfig::new("huge", 1.0e30, 48))
            .unwrap_err();
        assert!(matches!(err, LooperError::InvalidConstruction(_)));
        assert!(runtime.loops().is_empty());
        assert!(runtime.registry().is_empty());
    }

    #[test]
    fn parameter_range_wider_than_f32_is_rejected() {
        let mut runtime = runtime();
        let err = runtime
            .create_parameter(
                "synth/wide",
                "wide",
                SignalRange {
                    min: -f32::MAX,
                    max: f32::MAX,
                },
            )
            .unwrap_err();
        assert!(matches!(err, LooperError::InvalidRange { .. }));
    }

    #[test]
    fn clamp_policy_applies_to_producer_writes() {
        let config = RuntimeConfig {
            range_policy: RangePolicy::Clamp,
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::new(config, ParameterBank::new());
        runtime.create_loop(LoopConfig::new("loop", 1.0, 1)).unwrap();
        runtime.set_value_by_name("loop/input", 3.0).unwrap();
        assert_eq!(runtime.loop_by_name("loop").unwrap().input(), 1.0);
    }

    #[test]
    fn drains_queued_updates_before_tick() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("loop", 1.0, 2)).unwrap();
        let endpoints = runtime.loop_endpoints("loop").unwrap();
        let queue = UpdateQueue::bounded(16);
        let sender = queue.sender();

        sender.send(endpoints.record, 1.0);
        sender.send(endpoints.input, f32::INFINITY);
        sender.send(endpoints.input, 0.7);
        assert_eq!(runtime.drain(&queue), 2);
        assert!(queue.is_empty());

        runtime.tick().unwrap();
        assert_eq!(runtime.loop_by_name("loop").unwrap().slots(), &[Some(0.7), None]);
    }

    #[test]
    fn reconfigure_and_clear_by_name() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("loop", 1.0, 4)).unwrap();
        record_take(&mut runtime, "loop", &[0.1, 0.2]);

        runtime.reconfigure_loop("loop", 2.0, 8).unwrap();
        let looper = runtime.loop_by_name("loop").unwrap();
        assert_eq!(looper.total_pulses(), 16);
        assert!(!looper.has_take());

        record_take(&mut runtime, "loop", &[0.5]);
        runtime.clear_loop("loop").unwrap();
        assert_eq!(runtime.loop_by_name("loop").unwrap().state(), LoopState::Empty);

        assert!(matches!(
            runtime.clear_loop("missing"),
            Err(LooperError::UnknownLoop(_))
        ));
    }

    #[test]
    fn builds_demo_session() {
        let mut runtime =
            Runtime::from_session(&SessionConfig::demo(), ParameterBank::new()).unwrap();
        assert_eq!(runtime.loops().len(), 3);
        assert_eq!(runtime.router().len(), 3);
        assert_eq!(runtime.registry().len(), 12);

        let cutoff = runtime.registry().lookup("faust/cutoffFrequency").unwrap();
        let route = runtime.router().route_to(cutoff).unwrap();
        assert_eq!(route.transform.apply(0.5), 1525.0);

        for name in ["gainLoop", "cutoffLoop", "resonanceLoop"] {
            runtime.set_recording(name, true).unwrap();
        }
        for _ in 0..48 {
            runtime.tick().unwrap();
        }
        assert!(runtime.loops().iter().all(|looper| looper.cycles() == 1));
    }

    #[test]
    fn session_with_unknown_route_fails() {
        let mut session = SessionConfig::demo();
        session.routes[0].destination = "faust/missing".to_string();
        let err = Runtime::from_session(&session, ParameterBank::new()).unwrap_err();
        assert!(matches!(err, LooperError::UnknownSignalName(ref name) if name == "faust/missing"));
    }

    #[test]
    fn endpoint_names_resolve_to_handles() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("loop", 1.0, 1)).unwrap();
        let endpoints = runtime.loop_endpoints("loop").unwrap();
        for endpoint in Endpoint::ALL {
            let name = endpoint.signal_name("loop");
            assert_eq!(runtime.registry().lookup(&name).unwrap(), endpoints.get(endpoint));
        }
    }

    #[test]
    fn shutdown_closes_registry() {
        let mut runtime = runtime();
        runtime.create_loop(LoopConfig::new("loop", 1.0, 1)).unwrap();
        runtime.shutdown();

        assert!(runtime.loops().is_empty());
        assert!(runtime.router().is_empty());
        runtime.tick().unwrap();
        assert!(matches!(
            runtime.create_loop(LoopConfig::new("again", 1.0, 1)),
            Err(LooperError::RegistryShutdown)
        ));
    }
}
