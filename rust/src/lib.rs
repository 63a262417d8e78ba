//! Stochastic, discrete-time metapopulation SEIR simulator.
//!
//! Each node of a mobility graph runs an S -> E -> I1 -> I2 -> I3 -> R model
//! advanced by binomial draws; a mobility step moves individuals along the
//! graph before every epidemic step. Many independent realizations are run
//! in parallel with Rayon, each with its own random stream.
//!
//! This crate provides:
//! - SeirIntegrator: per-realization step function with dynamic filter
//! - RealizationDriver: collaborators, integration and export of one run
//! - run_parallel: batch fan-out over a bounded worker pool

pub mod batch;
pub mod compartment;
pub mod config;
pub mod draws;
pub mod driver;
pub mod error;
pub mod export;
pub mod filter;
pub mod mobility;
pub mod npi;
pub mod sampling;
pub mod seir;

#[cfg(feature = "python")]
mod python;

pub use batch::{run_parallel, BatchSummary};
pub use compartment::{Compartment, RowLabel};
pub use config::{RngStream, Setup, SetupConfig};
pub use draws::{ParameterConfig, RealizationDraw, SeedingEntry, SeedingMethod, SetupDraws};
pub use driver::{RealizationDriver, RealizationStatus};
pub use error::{Result, SeirError};
pub use export::{CsvSink, DailyRow, DailyTable, TrajectorySink};
pub use filter::DynamicFilter;
pub use mobility::{MobilityEdge, MobilityGraph, MobilitySampling, TransferKernel};
pub use npi::{InterventionPeriod, InterventionSource, NoIntervention, PeriodInterventions};
pub use seir::{
    IntegrationOutcome,
    RealizationParameters,
    Rejection,
    SeirIntegrator,
    TimeGrid,
    REJECTED_SENTINEL,
};
