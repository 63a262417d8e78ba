//! Non-pharmaceutical interventions: multiplicative transmission reductions.

use chrono::{Duration, NaiveDate};
use ndarray::Array2;
use serde::Deserialize;

use crate::config::Setup;
use crate::error::{Result, SeirError};

/// Source of a (day, node) matrix of transmission reductions in [0, 1].
///
/// A reduction `r` scales transmission by `1 - r`.
pub trait InterventionSource: Sync {
    fn compute(&self, setup: &Setup, node_names: &[String]) -> Result<Array2<f64>>;
}

/// No intervention anywhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIntervention;

impl InterventionSource for NoIntervention {
    fn compute(&self, setup: &Setup, node_names: &[String]) -> Result<Array2<f64>> {
        Ok(Array2::zeros((setup.grid.n_days + 1, node_names.len())))
    }
}

/// Constant reduction over an inclusive date range.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InterventionPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reduction: f64,
    /// Affected nodes; all nodes when absent.
    #[serde(default)]
    pub nodes: Option<Vec<String>>,
}

impl InterventionPeriod {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.end < self.start {
            return Err(SeirError::config(format!(
                "intervention ends ({}) before it starts ({})",
                self.end, self.start
            )));
        }
        if !(0.0..=1.0).contains(&self.reduction) {
            return Err(SeirError::config(format!(
                "intervention reduction {} outside [0, 1]",
                self.reduction
            )));
        }
        Ok(())
    }

    fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Interventions listed in the setup. Overlapping periods compound:
/// the combined reduction is `1 - Π(1 - r)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PeriodInterventions;

impl InterventionSource for PeriodInterventions {
    fn compute(&self, setup: &Setup, node_names: &[String]) -> Result<Array2<f64>> {
        let n_days = setup.grid.n_days + 1;
        let mut remaining = Array2::<f64>::ones((n_days, node_names.len()));

        for period in &setup.interventions {
            let columns: Vec<usize> = match &period.nodes {
                Some(names) => names
                    .iter()
                    .map(|name| {
                        node_names
                            .iter()
                            .position(|n| n == name)
                            .ok_or_else(|| SeirError::UnknownNode(name.clone()))
                    })
                    .collect::<Result<_>>()?,
                None => (0..node_names.len()).collect(),
            };

            for day in 0..n_days {
                let date = setup.start_date + Duration::days(day as i64);
                if !period.covers(date) {
                    continue;
                }
                for &col in &columns {
                    remaining[[day, col]] *= 1.0 - period.reduction;
                }
            }
        }

        Ok(remaining.mapv(|r| 1.0 - r))
    }
}
