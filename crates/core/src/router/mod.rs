//! Directed connections between signals.
//!
//! A destination signal is fed by at most one route: connecting a second
//! source to the same destination replaces the first route. Propagation is a
//! single synchronous hop, from an OUT signal straight into the owner of an
//! IN signal.

use serde::{Deserialize, Serialize};

use crate::{
    signal::{Direction, SignalId, SignalRange, SignalRegistry},
    LooperError, Result,
};

/// How a route converts source values into destination values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mapping {
    /// Rescale the source range onto the destination range.
    #[default]
    Linear,
    /// Forward the source value unscaled, clamped to the destination range.
    Raw,
}

/// Maps `value` from `source` onto `destination`, clamped to `destination`.
/// A result that overflows falls back to `value` clamped to `destination`.
///
/// Fails with [`LooperError::DegenerateRange`] when `source` has zero width.
pub fn linear_remap(value: f32, source: SignalRange, destination: SignalRange) -> Result<f32> {
    if source.is_degenerate() {
        return Err(LooperError::DegenerateRange {
            min: source.min,
            max: source.max,
        });
    }
    let mapped = destination.min
        + (value - source.min) / (source.max - source.min) * (destination.max - destination.min);
    if !mapped.is_finite() {
        return Ok(destination.clamp(value));
    }
    Ok(destination.clamp(mapped))
}

/// Transform resolved once at connect time from the declared ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Linear {
        source: SignalRange,
        destination: SignalRange,
    },
    /// Raw value clamped to the destination range. Used for [`Mapping::Raw`]
    /// and as the fallback for a degenerate source range.
    Clamp { destination: SignalRange },
}

impl Transform {
    fn resolve(mapping: Mapping, source: SignalRange, destination: SignalRange) -> Self {
        match mapping {
            Mapping::Linear if !source.is_degenerate() => Transform::Linear {
                source,
                destination,
            },
            Mapping::Linear | Mapping::Raw => Transform::Clamp { destination },
        }
    }

    pub fn apply(&self, value: f32) -> f32 {
        match *self {
            Transform::Linear {
                source,
                destination,
            } => linear_remap(value, source, destination)
                .unwrap_or_else(|_| destination.clamp(value)),
            Transform::Clamp { destination } => destination.clamp(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub source: SignalId,
    pub destination: SignalId,
    pub mapping: Mapping,
    pub transform: Transform,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `source` to `destination` with a linear remap.
    pub fn connect(
        &mut self,
        registry: &SignalRegistry,
        source: SignalId,
        destination: SignalId,
    ) -> Result<Option<Route>> {
        self.connect_with(registry, source, destination, Mapping::Linear)
    }

    /// Connects `source` to `destination`, returning the route it replaced if
    /// the destination was already fed.
    pub fn connect_with(
        &mut self,
        registry: &SignalRegistry,
        source: SignalId,
        destination: SignalId,
        mapping: Mapping,
    ) -> Result<Option<Route>> {
        let src = registry.get(source)?;
        let dst = registry.get(destination)?;
        if src.direction() != Direction::Out || dst.direction() != Direction::In {
            return Err(LooperError::DirectionMismatch {
                from: src.name().to_string(),
                to: dst.name().to_string(),
            });
        }

        if mapping == Mapping::Linear && src.range().is_degenerate() {
            tracing::warn!(
                source = src.name(),
                destination = dst.name(),
                "source range is degenerate, route forwards raw values"
            );
        }

        let route = Route {
            source,
            destination,
            mapping,
            transform: Transform::resolve(mapping, src.range(), dst.range()),
        };
        let replaced = self.disconnect(destination);
        match &replaced {
            Some(previous) => tracing::debug!(
                source = src.name(),
                destination = dst.name(),
                replaced = ?previous.source,
                "route replaced"
            ),
            None => tracing::debug!(
                source = src.name(),
                destination = dst.name(),
                "route connected"
            ),
        }
        self.routes.push(route);
        Ok(replaced)
    }

    /// Removes the route feeding `destination`, if any.
    pub fn disconnect(&mut self, destination: SignalId) -> Option<Route> {
        let index = self
            .routes
            .iter()
            .position(|route| route.destination == destination)?;
        Some(self.routes.remove(index))
    }

    pub fn route_to(&self, destination: SignalId) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| route.destination == destination)
    }

    /// Routes fed by `source`, in connection order.
    pub fn routes_from(&self, source: SignalId) -> impl Iterator<Item = &Route> {
        self.routes
            .iter()
            .filter(move |route| route.source == source)
    }

    /// Destination values produced by a change of `source` to `value`.
    pub fn on_source_changed(
        &self,
        source: SignalId,
        value: f32,
    ) -> impl Iterator<Item = (SignalId, f32)> + '_ {
        self.routes_from(source)
            .map(move |route| (route.destination, route.transform.apply(value)))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}
