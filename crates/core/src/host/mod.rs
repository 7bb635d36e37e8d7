use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Synthesis engine that owns named numeric parameters.
///
/// Calls are fire-and-forget: the core never observes a result.
pub trait ParameterHost {
    fn set_param_value(&mut self, param: &str, value: f32);
}

impl<H: ParameterHost + ?Sized> ParameterHost for Box<H> {
    fn set_param_value(&mut self, param: &str, value: f32) {
        (**self).set_param_value(param, value);
    }
}

/// Host that ignores every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl ParameterHost for NullHost {
    fn set_param_value(&mut self, _param: &str, _value: f32) {}
}

/// In-memory parameter store. Keeps the latest value of each parameter and
/// counts how many updates it received.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ParameterBank {
    values: HashMap<String, f32>,
    updates: u64,
}

impl ParameterBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-inserts a parameter so that later updates do not allocate.
    pub fn declare(&mut self, param: impl Into<String>, initial: f32) {
        self.values.insert(param.into(), initial);
    }

    pub fn get(&self, param: &str) -> Option<f32> {
        self.values.get(param).copied()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Parameters sorted by name.
    pub fn values(&self) -> Vec<(&str, f32)> {
        let mut values: Vec<_> = self
            .values
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        values.sort_by(|a, b| a.0.cmp(b.0));
        values
    }
}

impl ParameterHost for ParameterBank {
    fn set_param_value(&mut self, param: &str, value: f32) {
        self.updates += 1;
        match self.values.get_mut(param) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(param.to_string(), value);
            }
        }
    }
}
