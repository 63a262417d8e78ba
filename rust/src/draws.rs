//! Per-realization parameter and seeding draws.
//!
//! The driver only sees the [`RealizationDraw`] trait; [`SetupDraws`] is the
//! built-in implementation reading its priors from the [`Setup`].

use chrono::NaiveDate;
use ndarray::{Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::Deserialize;

use crate::config::{RngStream, Setup};
use crate::error::{Result, SeirError};
use crate::seir::RealizationParameters;

/// Number of infectious stages (I1, I2, I3) sharing the recovery rate.
pub const INFECTIOUS_STAGES: f64 = 3.0;

/// Priors for the epidemic parameters (rates per day).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Basic reproduction number range, drawn uniformly.
    pub r0: [f64; 2],
    /// Inverse mean infectious period range, drawn uniformly.
    pub gamma: [f64; 2],
    /// E -> I1 rate (inverse incubation period).
    pub sigma: f64,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            r0: [2.0, 3.0],
            gamma: [1.0 / 6.0, 1.0 / 2.6],
            sigma: 1.0 / 5.2,
        }
    }
}

impl ParameterConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        for (name, [lo, hi]) in [("r0", self.r0), ("gamma", self.gamma)] {
            if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
                return Err(SeirError::config(format!(
                    "parameter range {name} = [{lo}, {hi}] is invalid"
                )));
            }
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(SeirError::config(format!("sigma = {} is invalid", self.sigma)));
        }
        Ok(())
    }
}

/// Exogenous introduction of infectious individuals.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SeedingEntry {
    pub node: String,
    pub date: NaiveDate,
    /// Expected number of introductions.
    pub amount: f64,
}

/// How seeding amounts become counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedingMethod {
    /// Draw Poisson(amount).
    #[default]
    Poisson,
    /// Use the rounded amount as-is.
    Exact,
}

/// Source of a realization's parameters and seeding schedule.
///
/// Implementations must be deterministic in `uid`, so repeated runs of the
/// same realization see the same inputs.
pub trait RealizationDraw: Sync {
    /// Draw epidemic parameters given per-timestep reductions
    /// (n_steps × n_nodes).
    fn draw_parameters(
        &self,
        setup: &Setup,
        reductions: ArrayView2<f64>,
        uid: usize,
    ) -> Result<RealizationParameters>;

    /// Draw seeded counts per (day, node), shape (n_days + 1) × n_nodes.
    fn draw_seeding(&self, setup: &Setup, uid: usize) -> Result<Array2<u64>>;
}

/// Draws from the priors and seeding list of the setup.
#[derive(Clone, Copy, Debug, Default)]
pub struct SetupDraws;

impl RealizationDraw for SetupDraws {
    fn draw_parameters(
        &self,
        setup: &Setup,
        reductions: ArrayView2<f64>,
        uid: usize,
    ) -> Result<RealizationParameters> {
        let mut rng = setup.realization_rng(uid, RngStream::Parameters);
        let priors = &setup.parameters;

        let r0 = rng.gen_range(priors.r0[0]..=priors.r0[1]);
        let gamma = rng.gen_range(priors.gamma[0]..=priors.gamma[1]) * INFECTIOUS_STAGES;
        let beta = r0 * gamma / INFECTIOUS_STAGES;

        Ok(RealizationParameters {
            transmission: reductions.mapv(|reduction| beta * (1.0 - reduction)),
            infection_rate: priors.sigma,
            recovery_rate: gamma,
        })
    }

    fn draw_seeding(&self, setup: &Setup, uid: usize) -> Result<Array2<u64>> {
        let mut rng = setup.realization_rng(uid, RngStream::Seeding);
        let mut seeding = Array2::<u64>::zeros((setup.grid.n_days + 1, setup.n_nodes()));

        for entry in &setup.seeding {
            let node = setup.node_index(&entry.node)?;
            let Some(day) = setup.day_index(entry.date) else {
                continue;
            };
            let count = match setup.seeding_method {
                SeedingMethod::Exact => entry.amount.round() as u64,
                SeedingMethod::Poisson if entry.amount <= 0.0 => 0,
                SeedingMethod::Poisson => {
                    let dist = Poisson::<f64>::new(entry.amount).map_err(|e| {
                        SeirError::collaborator(uid, format!("seeding {}: {e}", entry.node))
                    })?;
                    dist.sample(&mut rng) as u64
                }
            };
            seeding[[day, node]] += count;
        }

        Ok(seeding)
    }
}
