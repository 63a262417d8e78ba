//! Timestep layout: `steps_per_day` sub-steps of length `dt` per day.

use crate::error::{Result, SeirError};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeGrid {
    pub dt: f64,
    pub steps_per_day: usize,
    /// Simulated span in days; the grid covers days `0..=n_days`.
    pub n_days: usize,
}

impl TimeGrid {
    /// Build a grid, requiring `1 / dt` to be a whole number of steps.
    pub fn new(dt: f64, n_days: usize) -> Result<Self> {
        if !dt.is_finite() || dt <= 0.0 || dt > 1.0 {
            return Err(SeirError::config(format!(
                "timestep must be in (0, 1] days, got {dt}"
            )));
        }
        let steps_per_day = (1.0 / dt).round();
        if (steps_per_day * dt - 1.0).abs() > 1e-9 {
            return Err(SeirError::config(format!(
                "timestep {dt} does not divide a day into whole steps"
            )));
        }
        Ok(Self {
            dt,
            steps_per_day: steps_per_day as usize,
            n_days,
        })
    }

    /// Number of recorded timesteps, both ends of the span included.
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.n_days * self.steps_per_day + 1
    }

    /// Simulation day a step falls in.
    #[inline]
    pub fn day(&self, step: usize) -> usize {
        step / self.steps_per_day
    }

    /// True for the first sub-step of every day.
    #[inline]
    pub fn is_day_aligned(&self, step: usize) -> bool {
        step % self.steps_per_day == 0
    }
}
