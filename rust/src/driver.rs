//! One realization end to end: collaborators, integration, export.

use std::path::PathBuf;

use log::debug;
use ndarray::Array2;
use uuid::Uuid;

use crate::config::{RngStream, Setup};
use crate::draws::RealizationDraw;
use crate::error::{Result, SeirError};
use crate::export::{DailyTable, TrajectorySink};
use crate::npi::InterventionSource;
use crate::seir::{IntegrationOutcome, Rejection, SeirIntegrator};

/// What happened to a realization.
#[derive(Clone, Debug, PartialEq)]
pub enum RealizationStatus {
    /// Trajectory kept; `output` is where it was persisted, if exporting.
    Completed { output: Option<PathBuf> },
    /// Trajectory failed the dynamic filter and was discarded.
    Rejected(Rejection),
}

impl RealizationStatus {
    pub fn is_rejected(&self) -> bool {
        matches!(self, RealizationStatus::Rejected(_))
    }
}

/// Runs realizations against a shared setup and collaborators.
///
/// Everything it holds is read-only, so one driver serves every worker.
#[derive(Clone, Copy)]
pub struct RealizationDriver<'a> {
    setup: &'a Setup,
    interventions: &'a dyn InterventionSource,
    draws: &'a dyn RealizationDraw,
    sink: Option<&'a dyn TrajectorySink>,
}

impl<'a> RealizationDriver<'a> {
    pub fn new(
        setup: &'a Setup,
        interventions: &'a dyn InterventionSource,
        draws: &'a dyn RealizationDraw,
    ) -> Self {
        Self {
            setup,
            interventions,
            draws,
            sink: None,
        }
    }

    /// Persist completed trajectories to `sink`; `None` disables export.
    pub fn with_sink(mut self, sink: Option<&'a dyn TrajectorySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn setup(&self) -> &'a Setup {
        self.setup
    }

    /// Draw inputs for realization `uid` and integrate it.
    pub fn simulate(&self, uid: usize) -> Result<IntegrationOutcome> {
        let setup = self.setup;
        let grid = setup.grid;
        let n_nodes = setup.n_nodes();

        let daily = self.interventions.compute(setup, &setup.node_names)?;
        check_shape("intervention matrix", daily.dim(), (grid.n_days + 1, n_nodes))?;
        let reductions = Array2::from_shape_fn((grid.n_steps(), n_nodes), |(step, node)| {
            daily[[grid.day(step), node]]
        });

        let seeding = self.draws.draw_seeding(setup, uid)?;
        check_shape("seeding", seeding.dim(), (grid.n_days + 1, n_nodes))?;

        let params = self.draws.draw_parameters(setup, reductions.view(), uid)?;
        check_shape(
            "transmission rates",
            params.transmission.dim(),
            (grid.n_steps(), n_nodes),
        )?;

        let kernel = setup.mobility.transfer_kernel(grid.dt, &setup.populations);
        let integrator = SeirIntegrator::new(&kernel, &setup.populations, grid)
            .with_filter(setup.dynamic_filter.as_ref())
            .with_sampling(setup.sampling);

        let mut rng = setup.realization_rng(uid, RngStream::Epidemic);
        Ok(integrator.integrate(&params, seeding.view(), &mut rng))
    }

    /// Simulate realization `uid` and export it when a sink is configured.
    ///
    /// Rejected trajectories are never exported.
    pub fn run(&self, uid: usize) -> Result<RealizationStatus> {
        match self.simulate(uid)? {
            IntegrationOutcome::Completed(states) => {
                let output = match self.sink {
                    Some(sink) => {
                        let table = DailyTable::from_states(
                            &states,
                            &self.setup.grid,
                            self.setup.start_date,
                            &self.setup.node_names,
                        );
                        let path = sink.persist(&table, &Uuid::new_v4().to_string())?;
                        debug!("realization {uid} written to {}", path.display());
                        Some(path)
                    }
                    None => None,
                };
                Ok(RealizationStatus::Completed { output })
            }
            IntegrationOutcome::Rejected(rejection) => {
                debug!(
                    "realization {uid} rejected on day {} at node {} (cumI {} < {})",
                    rejection.day,
                    self.setup.node_names[rejection.node],
                    rejection.cumulative_incidence,
                    rejection.threshold
                );
                Ok(RealizationStatus::Rejected(rejection))
            }
        }
    }
}

fn check_shape(what: &'static str, found: (usize, usize), expected: (usize, usize)) -> Result<()> {
    if found != expected {
        return Err(SeirError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}
