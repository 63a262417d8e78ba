//! Mobility graph coupling the nodes of the metapopulation.
//!
//! The graph is built once per batch and never mutated. Each realization
//! derives a [`TransferKernel`] (per-step transfer probabilities) from it
//! and samples transfers into a private [`TransferBuffer`].

use std::path::Path;

use ndarray::{s, Array2, ArrayView2, ArrayViewMut2};
use rand::Rng;
use serde::Deserialize;

use crate::compartment::Compartment;
use crate::error::{Result, SeirError};
use crate::sampling::{binomial, rate_to_probability};

/// Directed, rated connection between two nodes (individuals per day).
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct MobilityEdge {
    pub origin: usize,
    pub destination: usize,
    pub rate: f64,
}

/// How departures along edges that share an origin are sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilitySampling {
    /// One binomial per edge against the pre-mobility count. Edges sharing an
    /// origin are truncated to what is left at the origin.
    #[default]
    Independent,
    /// One binomial for all departures of a node, split across its outgoing
    /// edges proportionally to their rates.
    Multinomial,
}

/// Row of a mobility CSV file.
#[derive(Debug, Deserialize)]
struct EdgeRecord {
    ori: usize,
    dest: usize,
    amount: f64,
}

/// Sparse directed graph over `n_nodes` nodes.
#[derive(Clone, Debug)]
pub struct MobilityGraph {
    n_nodes: usize,
    edges: Vec<MobilityEdge>,
}

impl MobilityGraph {
    /// Build a graph, rejecting edges that reference unknown nodes, self loops
    /// and rates that are negative or not finite.
    pub fn new(n_nodes: usize, edges: Vec<MobilityEdge>) -> Result<Self> {
        for edge in &edges {
            if edge.origin >= n_nodes || edge.destination >= n_nodes {
                return Err(SeirError::EdgeOutOfRange {
                    origin: edge.origin,
                    destination: edge.destination,
                    n_nodes,
                });
            }
            if edge.origin == edge.destination {
                return Err(SeirError::config(format!(
                    "mobility edge {} -> {} is a self loop",
                    edge.origin, edge.destination
                )));
            }
            if !edge.rate.is_finite() || edge.rate < 0.0 {
                return Err(SeirError::config(format!(
                    "mobility edge {} -> {} has invalid rate {}",
                    edge.origin, edge.destination, edge.rate
                )));
            }
        }
        Ok(Self { n_nodes, edges })
    }

    /// Graph without edges: nodes evolve independently.
    pub fn empty(n_nodes: usize) -> Self {
        Self {
            n_nodes,
            edges: Vec::new(),
        }
    }

    /// Read an edge list with columns `ori,dest,amount`.
    pub fn read_edges_csv(path: impl AsRef<Path>) -> Result<Vec<MobilityEdge>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut edges = Vec::new();
        for record in reader.deserialize() {
            let record: EdgeRecord = record?;
            edges.push(MobilityEdge {
                origin: record.ori,
                destination: record.dest,
                rate: record.amount,
            });
        }
        Ok(edges)
    }

    pub fn edges(&self) -> &[MobilityEdge] {
        &self.edges
    }

    /// Derive per-step transfer probabilities for a timestep `dt`.
    ///
    /// Edge probability is `1 - exp(-dt * rate / population[origin])`.
    pub fn transfer_kernel(&self, dt: f64, populations: &[u64]) -> TransferKernel {
        let n_edges = self.edges.len();
        let mut origins = Vec::with_capacity(n_edges);
        let mut destinations = Vec::with_capacity(n_edges);
        let mut rates = Vec::with_capacity(n_edges);
        let mut probabilities = Vec::with_capacity(n_edges);
        let mut outgoing = vec![Vec::new(); self.n_nodes];
        let mut total_rate = vec![0.0; self.n_nodes];

        for (e, edge) in self.edges.iter().enumerate() {
            let per_capita = edge.rate / populations[edge.origin] as f64;
            origins.push(edge.origin);
            destinations.push(edge.destination);
            rates.push(edge.rate);
            probabilities.push(rate_to_probability(per_capita, dt));
            if edge.rate > 0.0 {
                outgoing[edge.origin].push(e);
                total_rate[edge.origin] += edge.rate;
            }
        }

        let departure_probabilities = total_rate
            .iter()
            .zip(populations)
            .map(|(&rate, &pop)| rate_to_probability(rate / pop as f64, dt))
            .collect();

        TransferKernel {
            origins,
            destinations,
            rates,
            probabilities,
            outgoing,
            departure_probabilities,
        }
    }
}

/// Edge list with precomputed per-step probabilities.
#[derive(Clone, Debug)]
pub struct TransferKernel {
    pub origins: Vec<usize>,
    pub destinations: Vec<usize>,
    pub rates: Vec<f64>,
    pub probabilities: Vec<f64>,
    /// Indices of the positive-rate edges leaving each node.
    pub outgoing: Vec<Vec<usize>>,
    /// Probability that an individual leaves a node along any edge.
    pub departure_probabilities: Vec<f64>,
}

impl TransferKernel {
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Sample this step's transfers from the frozen `state` into `buffer`.
    ///
    /// `state` is never written; every draw sees the pre-mobility counts.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        sampling: MobilitySampling,
        state: ArrayView2<i64>,
        buffer: &mut TransferBuffer,
        rng: &mut R,
    ) {
        match sampling {
            MobilitySampling::Independent => self.sample_independent(state, buffer, rng),
            MobilitySampling::Multinomial => self.sample_multinomial(state, buffer, rng),
        }
    }

    fn sample_independent<R: Rng + ?Sized>(
        &self,
        state: ArrayView2<i64>,
        buffer: &mut TransferBuffer,
        rng: &mut R,
    ) {
        for e in 0..self.len() {
            let (origin, destination) = (self.origins[e], self.destinations[e]);
            for c in Compartment::POPULATION {
                let row = c.index();
                let frozen = state[[row, origin]];
                let drawn = binomial(rng, frozen, self.probabilities[e]);
                let left = frozen - buffer.outflow[[row, origin]];
                buffer.transfer(row, origin, destination, drawn.min(left));
            }
        }
    }

    fn sample_multinomial<R: Rng + ?Sized>(
        &self,
        state: ArrayView2<i64>,
        buffer: &mut TransferBuffer,
        rng: &mut R,
    ) {
        for (origin, edges) in self.outgoing.iter().enumerate() {
            if edges.is_empty() {
                continue;
            }
            let total_rate: f64 = edges.iter().map(|&e| self.rates[e]).sum();
            for c in Compartment::POPULATION {
                let row = c.index();
                let mut leaving = binomial(
                    rng,
                    state[[row, origin]],
                    self.departure_probabilities[origin],
                );
                let mut remaining_rate = total_rate;
                for (k, &e) in edges.iter().enumerate() {
                    if leaving == 0 {
                        break;
                    }
                    let moved = if k + 1 == edges.len() {
                        leaving
                    } else if remaining_rate > 0.0 {
                        binomial(rng, leaving, (self.rates[e] / remaining_rate).min(1.0))
                    } else {
                        0
                    };
                    remaining_rate -= self.rates[e];
                    leaving -= moved;
                    buffer.transfer(row, origin, self.destinations[e], moved);
                }
            }
        }
    }
}

/// Pending mobility flows of one step, kept apart from the live state.
#[derive(Clone, Debug)]
pub struct TransferBuffer {
    outflow: Array2<i64>,
    inflow: Array2<i64>,
}

impl TransferBuffer {
    pub fn new(n_nodes: usize) -> Self {
        let shape = (Compartment::POPULATION.len(), n_nodes);
        Self {
            outflow: Array2::zeros(shape),
            inflow: Array2::zeros(shape),
        }
    }

    #[inline]
    fn transfer(&mut self, row: usize, origin: usize, destination: usize, amount: i64) {
        if amount > 0 {
            self.outflow[[row, origin]] += amount;
            self.inflow[[row, destination]] += amount;
        }
    }

    /// Add the pending flows to `state` and clear the buffer.
    pub fn apply(&mut self, mut state: ArrayViewMut2<i64>) {
        let mut people = state.slice_mut(s![..Compartment::POPULATION.len(), ..]);
        people += &self.inflow;
        people -= &self.outflow;
        self.inflow.fill(0);
        self.outflow.fill(0);
    }
}
