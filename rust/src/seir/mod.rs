//! Discrete-time stochastic SEIR dynamics on a metapopulation.
//!
//! This module provides:
//! - TimeGrid: sub-daily timestep layout of a simulation
//! - SeirIntegrator: binomial step function with mobility coupling
//! - IntegrationOutcome: completed trajectory or dynamic-filter rejection

pub mod grid;
pub mod integrator;

pub use grid::TimeGrid;
pub use integrator::{
    IntegrationOutcome,
    RealizationParameters,
    Rejection,
    SeirIntegrator,
    REJECTED_SENTINEL,
};
