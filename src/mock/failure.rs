//! Scripted backend failures.
//!
//! Each backend stage can be given a delay, an error, or both. An error can
//! be limited to the first N calls so tests can model flaky compilers.

use std::collections::HashMap;
use std::time::Duration;

/// A backend call that failures can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendStage {
    Lower,
    Build,
    Aot,
    Load,
}

/// What happens when a stage is called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureConfig {
    /// Message of the error returned by the stage
    pub error: Option<String>,
    /// Sleep before the stage returns
    pub delay: Option<Duration>,
    /// Calls affected before the stage behaves normally; `None` is every call
    pub times: Option<u32>,
}

impl FailureConfig {
    /// Fail every call with `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Slow every call down without failing it.
    pub fn delay(duration: Duration) -> Self {
        Self {
            delay: Some(duration),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, duration: Duration) -> Self {
        self.delay = Some(duration);
        self
    }

    /// Only affect the first `calls` calls.
    pub fn times(mut self, calls: u32) -> Self {
        self.times = Some(calls);
        self
    }
}

/// Per-stage scripted failures and how often each stage has been hit.
#[derive(Debug, Default)]
pub struct FailureInjector {
    stages: HashMap<BackendStage, (FailureConfig, u32)>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `stage`, replacing any earlier script and resetting its count.
    pub fn inject(&mut self, stage: BackendStage, config: FailureConfig) {
        self.stages.insert(stage, (config, 0));
    }

    pub fn clear(&mut self) {
        self.stages.clear();
    }

    /// Record a call to `stage` and return the script that applies to it.
    pub fn check(&mut self, stage: BackendStage) -> Option<FailureConfig> {
        let (config, calls) = self.stages.get_mut(&stage)?;
        *calls += 1;
        match config.times {
            Some(limit) if *calls > limit => None,
            _ => Some(config.clone()),
        }
    }
}
