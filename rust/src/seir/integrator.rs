//! Binomial step integrator for the metapopulation SEIR model.
//!
//! Advances seven compartments (S, E, I1, I2, I3, R, cumI) per node through
//! a fixed timestep grid. Each step:
//! 1. Seed infectious individuals on day-aligned steps
//! 2. Sample mobility transfers from the frozen state, then apply them
//! 3. Sample epidemic transitions from the post-mobility state
//! 4. Check the dynamic filter on day-aligned steps
//! 5. Record the state column
//!
//! Key feature: rejection is an explicit outcome, never a partial trajectory.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut1};
use rand::Rng;

use crate::compartment::Compartment;
use crate::filter::DynamicFilter;
use crate::mobility::{MobilitySampling, TransferBuffer, TransferKernel};
use crate::sampling::{binomial, rate_to_probability};

use super::grid::TimeGrid;

const S: usize = Compartment::Susceptible.index();
const E: usize = Compartment::Exposed.index();
const I1: usize = Compartment::Infectious1.index();
const I2: usize = Compartment::Infectious2.index();
const I3: usize = Compartment::Infectious3.index();
const R: usize = Compartment::Recovered.index();
const CUM_I: usize = Compartment::CumulativeIncidence.index();

/// Value filling every entry of a rejected trajectory tensor.
pub const REJECTED_SENTINEL: i64 = -1;

/// Epidemic parameters of one realization.
#[derive(Clone, Debug)]
pub struct RealizationParameters {
    /// NPI-adjusted transmission rate, indexed (timestep, node).
    pub transmission: Array2<f64>,
    /// E -> I1 rate (sigma).
    pub infection_rate: f64,
    /// Rate of each infectious stage transition (gamma).
    pub recovery_rate: f64,
}

/// Where and why a trajectory failed the dynamic filter.
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub day: usize,
    pub step: usize,
    pub node: usize,
    pub cumulative_incidence: i64,
    pub threshold: f64,
    /// Shape of the trajectory tensor that was discarded.
    pub shape: (usize, usize, usize),
}

impl Rejection {
    /// Tensor of the trajectory's shape filled with [`REJECTED_SENTINEL`].
    pub fn sentinel_tensor(&self) -> Array3<i64> {
        Array3::from_elem(self.shape, REJECTED_SENTINEL)
    }
}

/// Result of integrating one realization.
#[derive(Clone, Debug, PartialEq)]
pub enum IntegrationOutcome {
    /// States indexed (compartment, node, timestep).
    Completed(Array3<i64>),
    Rejected(Rejection),
}

impl IntegrationOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, IntegrationOutcome::Rejected(_))
    }

    pub fn states(&self) -> Option<&Array3<i64>> {
        match self {
            IntegrationOutcome::Completed(states) => Some(states),
            IntegrationOutcome::Rejected(_) => None,
        }
    }

    /// Flatten into a tensor, sentinel-filled when rejected.
    pub fn into_tensor(self) -> Array3<i64> {
        match self {
            IntegrationOutcome::Completed(states) => states,
            IntegrationOutcome::Rejected(rejection) => rejection.sentinel_tensor(),
        }
    }
}

/// Stochastic integrator over a shared, read-only mobility kernel.
pub struct SeirIntegrator<'a> {
    kernel: &'a TransferKernel,
    populations: &'a [u64],
    grid: TimeGrid,
    filter: Option<&'a DynamicFilter>,
    sampling: MobilitySampling,
}

impl<'a> SeirIntegrator<'a> {
    /// Create an integrator without dynamic filter, using independent
    /// per-edge mobility sampling.
    pub fn new(kernel: &'a TransferKernel, populations: &'a [u64], grid: TimeGrid) -> Self {
        Self {
            kernel,
            populations,
            grid,
            filter: None,
            sampling: MobilitySampling::default(),
        }
    }

    pub fn with_filter(mut self, filter: Option<&'a DynamicFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sampling(mut self, sampling: MobilitySampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Integrate one realization.
    ///
    /// # Arguments
    /// * `params` - Transmission rates (n_steps × n_nodes) and scalar rates
    /// * `seeding` - Seeded infectious counts (n_days + 1 × n_nodes)
    /// * `rng` - Realization-private random stream
    ///
    /// # Returns
    /// * Completed (compartment, node, timestep) tensor, or the rejection
    ///   found at the first failing day-aligned checkpoint
    pub fn integrate<G: Rng + ?Sized>(
        &self,
        params: &RealizationParameters,
        seeding: ArrayView2<u64>,
        rng: &mut G,
    ) -> IntegrationOutcome {
        let n_nodes = self.populations.len();
        let n_steps = self.grid.n_steps();

        let mut y = Array2::<i64>::zeros((Compartment::COUNT, n_nodes));
        for (i, &pop) in self.populations.iter().enumerate() {
            y[[S, i]] = pop as i64;
        }
        let mut transfers = TransferBuffer::new(n_nodes);
        let mut states = Array3::<i64>::zeros((Compartment::COUNT, n_nodes, n_steps));

        let p_infect = rate_to_probability(params.infection_rate, self.grid.dt);
        let p_recover = rate_to_probability(params.recovery_rate, self.grid.dt);

        for step in 0..n_steps {
            let day = self.grid.day(step);
            let is_checkpoint = self.grid.is_day_aligned(step);

            if is_checkpoint {
                for i in 0..n_nodes {
                    let seeded = seeding[[day, i]] as i64;
                    y[[I1, i]] += seeded;
                    y[[CUM_I, i]] += seeded;
                }
            }

            // All draws see the pre-mobility state; flows land afterwards.
            self.kernel.sample(self.sampling, y.view(), &mut transfers, rng);
            transfers.apply(y.view_mut());

            for i in 0..n_nodes {
                let beta = params.transmission[[step, i]];
                let population = self.populations[i] as f64;
                self.advance_node(y.column_mut(i), beta, population, p_infect, p_recover, rng);

                if is_checkpoint {
                    if let Some(filter) = self.filter {
                        let cumulative = y[[CUM_I, i]];
                        if !filter.accepts(day, i, cumulative) {
                            return IntegrationOutcome::Rejected(Rejection {
                                day,
                                step,
                                node: i,
                                cumulative_incidence: cumulative,
                                threshold: filter.threshold(day, i).unwrap_or(f64::NAN),
                                shape: states.dim(),
                            });
                        }
                    }
                }
            }

            states.slice_mut(s![.., .., step]).assign(&y);
        }

        IntegrationOutcome::Completed(states)
    }

    /// Sample and apply one step of epidemic transitions at a single node.
    fn advance_node<G: Rng + ?Sized>(
        &self,
        mut node: ArrayViewMut1<i64>,
        beta: f64,
        population: f64,
        p_infect: f64,
        p_recover: f64,
        rng: &mut G,
    ) {
        let infectious = (node[I1] + node[I2] + node[I3]) as f64;
        let p_expose = rate_to_probability(beta * infectious / population, self.grid.dt);

        let exposed = binomial(rng, node[S], p_expose);
        let incident = binomial(rng, node[E], p_infect);
        let progressed_1 = binomial(rng, node[I1], p_recover);
        let progressed_2 = binomial(rng, node[I2], p_recover);
        let recovered = binomial(rng, node[I3], p_recover);

        node[S] -= exposed;
        node[E] += exposed - incident;
        node[I1] += incident - progressed_1;
        node[I2] += progressed_1 - progressed_2;
        node[I3] += progressed_2 - recovered;
        node[R] += recovered;
        node[CUM_I] += exposed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobility::{MobilityEdge, MobilityGraph};
    use ndarray::Axis;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const PEOPLE: [usize; 6] = [S, E, I1, I2, I3, R];

    fn params(
        grid: &TimeGrid,
        n_nodes: usize,
        beta: f64,
        sigma: f64,
        gamma: f64,
    ) -> RealizationParameters {
        RealizationParameters {
            transmission: Array2::from_elem((grid.n_steps(), n_nodes), beta),
            infection_rate: sigma,
            recovery_rate: gamma,
        }
    }

    fn seed_day_zero(grid: &TimeGrid, counts: &[u64]) -> Array2<u64> {
        let mut seeding = Array2::zeros((grid.n_days + 1, counts.len()));
        for (i, &c) in counts.iter().enumerate() {
            seeding[[0, i]] = c;
        }
        seeding
    }

    fn population_total(states: &Array3<i64>, node: usize, step: usize) -> i64 {
        PEOPLE.iter().map(|&c| states[[c, node, step]]).sum()
    }

    #[test]
    fn test_zero_transmission_keeps_susceptibles() {
        let grid = TimeGrid::new(0.25, 20).unwrap();
        let populations = [1000, 800];
        let kernel = MobilityGraph::empty(2).transfer_kernel(grid.dt, &populations);
        let integrator = SeirIntegrator::new(&kernel, &populations, grid);
        let mut rng = StdRng::seed_from_u64(1);

        let outcome = integrator.integrate(
            &params(&grid, 2, 0.0, 0.0, 0.0),
            seed_day_zero(&grid, &[0, 0]).view(),
            &mut rng,
        );
        let states = outcome.states().unwrap();

        for step in 0..grid.n_steps() {
            assert_eq!(states[[S, 0, step]], 1000);
            assert_eq!(states[[S, 1, step]], 800);
            for c in [E, I1, I2, I3, R, CUM_I] {
                assert_eq!(states[[c, 0, step]], 0);
                assert_eq!(states[[c, 1, step]], 0);
            }
        }
    }

    #[test]
    fn test_single_node_outbreak_conserves_population() {
        let grid = TimeGrid::new(0.25, 60).unwrap();
        let populations = [1000];
        let kernel = MobilityGraph::empty(1).transfer_kernel(grid.dt, &populations);
        let integrator = SeirIntegrator::new(&kernel, &populations, grid);
        let mut rng = StdRng::seed_from_u64(42);

        let outcome = integrator.integrate(
            &params(&grid, 1, 0.8, 1.0 / 5.2, 0.5),
            seed_day_zero(&grid, &[10]).view(),
            &mut rng,
        );
        let states = outcome.states().unwrap();
        let last = grid.n_steps() - 1;

        assert!(states[[CUM_I, 0, last]] >= 10);
        for step in 0..grid.n_steps() {
            assert_eq!(population_total(states, 0, step), 1010);
            assert!(states.slice(s![.., 0, step]).iter().all(|&v| v >= 0));
        }
        // Seeds plus exposures account for every susceptible lost.
        assert_eq!(states[[CUM_I, 0, last]], 1010 - states[[S, 0, last]]);
    }

    #[test]
    fn test_cumulative_incidence_is_monotone() {
        let grid = TimeGrid::new(0.5, 40).unwrap();
        let populations = [500, 2000, 1200];
        let graph = MobilityGraph::new(
            3,
            vec![
                MobilityEdge { origin: 0, destination: 1, rate: 40.0 },
                MobilityEdge { origin: 1, destination: 2, rate: 80.0 },
                MobilityEdge { origin: 2, destination: 0, rate: 20.0 },
            ],
        )
        .unwrap();
        let kernel = graph.transfer_kernel(grid.dt, &populations);
        let integrator = SeirIntegrator::new(&kernel, &populations, grid);
        let mut rng = StdRng::seed_from_u64(9);

        let outcome = integrator.integrate(
            &params(&grid, 3, 0.6, 0.3, 0.4),
            seed_day_zero(&grid, &[5, 0, 0]).view(),
            &mut rng,
        );
        let cum = outcome.states().unwrap().index_axis(Axis(0), CUM_I).to_owned();

        for node in 0..3 {
            let series = cum.row(node);
            assert!(series.windows(2).into_iter().all(|w| w[1] >= w[0]));
        }
    }

    #[test]
    fn test_mobility_conserves_total_population() {
        let grid = TimeGrid::new(0.25, 30).unwrap();
        let populations = [5000, 100];
        let graph = MobilityGraph::new(
            2,
            vec![MobilityEdge { origin: 0, destination: 1, rate: 2000.0 }],
        )
        .unwrap();
        let kernel = graph.transfer_kernel(grid.dt, &populations);
        let integrator = SeirIntegrator::new(&kernel, &populations, grid);
        let mut rng = StdRng::seed_from_u64(17);

        let outcome = integrator.integrate(
            &params(&grid, 2, 0.0, 0.0, 0.0),
            seed_day_zero(&grid, &[0, 0]).view(),
            &mut rng,
        );
        let states = outcome.states().unwrap();

        for step in 0..grid.n_steps() {
            let total = population_total(states, 0, step) + population_total(states, 1, step);
            assert_eq!(total, 5100);
        }
        // One-way flow drains the origin towards the destination.
        let last = grid.n_steps() - 1;
        assert!(states[[S, 1, last]] > 100);
        assert!(states[[S, 0, last]] < 5000);
    }

    #[test]
    fn test_seeding_lands_in_first_infectious_stage() {
        let grid = TimeGrid::new(0.5, 3).unwrap();
        let populations = [100];
        let kernel = MobilityGraph::empty(1).transfer_kernel(grid.dt, &populations);
        let integrator = SeirIntegrator::new(&kernel, &populations, grid);
        let mut seeding = Array2::zeros((4, 1));
        seeding[[2, 0]] = 7;
        let mut rng = StdRng::seed_from_u64(2);

        let outcome = integrator.integrate(
            &params(&grid, 1, 0.0, 0.0, 0.0),
            seeding.view(),
            &mut rng,
        );
        let states = outcome.states().unwrap();

        assert_eq!(states[[I1, 0, 3]], 0);
        assert_eq!(states[[I1, 0, 4]], 7);
        assert_eq!(states[[CUM_I, 0, 4]], 7);
        assert_eq!(states[[S, 0, 4]], 100);
    }

    #[test]
    fn test_filter_rejects_at_first_failing_checkpoint() {
        let grid = TimeGrid::new(0.25, 10).unwrap();
        let populations = [1000];
        let kernel = MobilityGraph::empty(1).transfer_kernel(grid.dt, &populations);
        // Day 0 passes, day 1 demands more incidence than the population.
        let mut thresholds = Array2::zeros((11, 1));
        thresholds[[1, 0]] = 1e9;
        let filter = DynamicFilter::new(thresholds, 1).unwrap();
        let integrator =
            SeirIntegrator::new(&kernel, &populations, grid).with_filter(Some(&filter));
        let mut rng = StdRng::seed_from_u64(4);

        let outcome = integrator.integrate(
            &params(&grid, 1, 0.5, 0.2, 0.3),
            seed_day_zero(&grid, &[10]).view(),
            &mut rng,
        );

        match &outcome {
            IntegrationOutcome::Rejected(rejection) => {
                assert_eq!(rejection.day, 1);
                assert_eq!(rejection.step, grid.steps_per_day);
                assert_eq!(rejection.node, 0);
                assert_eq!(rejection.threshold, 1e9);
            }
            IntegrationOutcome::Completed(_) => panic!("trajectory should be rejected"),
        }
        let tensor = outcome.into_tensor();
        assert_eq!(tensor.dim(), (Compartment::COUNT, 1, grid.n_steps()));
        assert!(tensor.iter().all(|&v| v == REJECTED_SENTINEL));
    }

    #[test]
    fn test_filter_accepts_reachable_thresholds() {
        let grid = TimeGrid::new(0.25, 5).unwrap();
        let populations = [1000, 1000];
        let kernel = MobilityGraph::empty(2).transfer_kernel(grid.dt, &populations);
        let filter = DynamicFilter::new(Array2::from_elem((6, 2), 3.0), 2).unwrap();
        let integrator =
            SeirIntegrator::new(&kernel, &populations, grid).with_filter(Some(&filter));
        let mut rng = StdRng::seed_from_u64(4);

        let outcome = integrator.integrate(
            &params(&grid, 2, 0.5, 0.2, 0.3),
            seed_day_zero(&grid, &[3, 3]).view(),
            &mut rng,
        );
        assert!(!outcome.is_rejected());
    }

    #[test]
    fn test_identical_seed_reproduces_trajectory() {
        let grid = TimeGrid::new(0.25, 15).unwrap();
        let populations = [3000, 1500];
        let graph = MobilityGraph::new(
            2,
            vec![
                MobilityEdge { origin: 0, destination: 1, rate: 100.0 },
                MobilityEdge { origin: 1, destination: 0, rate: 100.0 },
            ],
        )
        .unwrap();
        let kernel = graph.transfer_kernel(grid.dt, &populations);
        let integrator = SeirIntegrator::new(&kernel, &populations, grid)
            .with_sampling(MobilitySampling::Multinomial);
        let p = params(&grid, 2, 0.7, 0.25, 0.4);
        let seeding = seed_day_zero(&grid, &[20, 0]);

        let a = integrator.integrate(&p, seeding.view(), &mut StdRng::seed_from_u64(99));
        let b = integrator.integrate(&p, seeding.view(), &mut StdRng::seed_from_u64(99));
        let c = integrator.integrate(&p, seeding.view(), &mut StdRng::seed_from_u64(100));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
