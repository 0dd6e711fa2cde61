//! High-level runtime engine settings
//!
//! Selects how the simulation is driven (inline in the render loop or on its
//! own thread) and how the time step is chosen each tick

use serde::Deserialize;

use crate::error::{SimError, SimResult};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    Inline, // step inside the render loop
    #[default]
    Threaded, // step on a dedicated simulation thread
}

#[derive(Debug, Clone, PartialEq)]
pub struct Engine {
    pub thread_mode: ThreadMode,
    pub fixed_dt: Option<f64>, // overrides the measured delta when set
    pub max_dt: f64,           // clamp on the measured delta
    pub tick_rate: Option<f64>, // simulation-loop cadence cap (Hz), threaded mode only
}

impl Engine {
    /// Reject step settings that cannot drive a tick
    pub fn validate(&self) -> SimResult<()> {
        let checks = [
            ("max_dt", Some(self.max_dt)),
            ("fixed_dt", self.fixed_dt),
            ("tick_rate", self.tick_rate),
        ];
        for (name, value) in checks {
            if let Some(value) = value {
                if !(value > 0.0 && value.is_finite()) {
                    return Err(SimError::InvalidTimeStep { name, value });
                }
            }
        }
        if let Some(rate) = self.tick_rate {
            if !(1.0 / rate).is_finite() {
                return Err(SimError::InvalidTimeStep {
                    name: "tick_rate",
                    value: rate,
                });
            }
        }
        Ok(())
    }

    /// Time step to integrate for a measured wall-clock delta
    pub fn step_dt(&self, measured: f64) -> f64 {
        match self.fixed_dt {
            Some(dt) => dt,
            None => measured.max(0.0).min(self.max_dt),
        }
    }
}
