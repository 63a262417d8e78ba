//! Fan-out of realizations over a bounded worker pool.
//!
//! Realizations share nothing mutable: each one owns its state tensor,
//! transfer buffers and random streams, and only reads the setup.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;

use crate::driver::{RealizationDriver, RealizationStatus};
use crate::error::{Result, SeirError};

/// Aggregate outcome of a batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub completed: usize,
    pub rejected: usize,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.completed + self.rejected
    }

    fn record(&mut self, status: &RealizationStatus) {
        if status.is_rejected() {
            self.rejected += 1;
        } else {
            self.completed += 1;
        }
    }
}

/// Run realizations `0..nsim` of the driver's setup.
///
/// # Arguments
/// * `driver` - Shared, read-only realization driver
/// * `n_jobs` - Worker count; 1 runs sequentially in the calling thread
///
/// # Returns
/// * Counts of completed and rejected realizations with wall-clock time.
///   The first realization error aborts the batch and is returned.
pub fn run_parallel(driver: &RealizationDriver, n_jobs: usize) -> Result<BatchSummary> {
    if n_jobs == 0 {
        return Err(SeirError::config("worker count must be at least 1"));
    }

    let start = Instant::now();
    let nsim = driver.setup().nsim;
    let progress = progress_bar(nsim)?;

    let run_one = |uid: usize| {
        let status = driver.run(uid);
        progress.inc(1);
        status
    };

    let statuses: Vec<RealizationStatus> = if n_jobs == 1 {
        (0..nsim).map(run_one).collect::<Result<_>>()?
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .build()?;
        pool.install(|| (0..nsim).into_par_iter().map(run_one).collect::<Result<Vec<_>>>())?
    };
    progress.finish_and_clear();

    let mut summary = BatchSummary::default();
    for status in &statuses {
        summary.record(status);
    }
    summary.elapsed = start.elapsed();

    info!(
        "{} simulations completed in {:.1} seconds",
        nsim,
        summary.elapsed.as_secs_f64()
    );
    if summary.rejected > 0 {
        warn!(
            "{} of {} realizations rejected by the dynamic filter",
            summary.rejected, nsim
        );
    }

    Ok(summary)
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );
    bar.set_message("realizations");
    Ok(bar)
}
