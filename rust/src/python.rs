//! Python entry points.

use numpy::PyArray3;
use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::batch::run_parallel;
use crate::config::Setup;
use crate::draws::SetupDraws;
use crate::driver::RealizationDriver;
use crate::error::SeirError;
use crate::export::{CsvSink, TrajectorySink};
use crate::npi::PeriodInterventions;

fn to_py_err(err: SeirError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(err.to_string())
}

/// Run a whole batch from a JSON setup file.
///
/// # Arguments
/// * `config_path` - Path to the JSON setup
/// * `n_jobs` - Worker count (1 = sequential)
///
/// # Returns
/// * Tuple of (completed, rejected, elapsed_seconds)
#[pyfunction]
#[pyo3(signature = (config_path, n_jobs=1))]
fn run_batch(py: Python<'_>, config_path: &str, n_jobs: usize) -> PyResult<(usize, usize, f64)> {
    let setup = Setup::from_json_file(config_path).map_err(to_py_err)?;

    let summary = py
        .allow_threads(|| {
            let sink = CsvSink::for_setup(&setup);
            let driver = RealizationDriver::new(&setup, &PeriodInterventions, &SetupDraws)
                .with_sink(setup.write_csv.then_some(&sink as &dyn TrajectorySink));
            run_parallel(&driver, n_jobs)
        })
        .map_err(to_py_err)?;

    Ok((summary.completed, summary.rejected, summary.elapsed.as_secs_f64()))
}

/// Simulate one realization without exporting it.
///
/// # Returns
/// * (compartment, node, timestep) array; every entry is -1 when the
///   trajectory was rejected by the dynamic filter
#[pyfunction]
fn simulate_realization<'py>(
    py: Python<'py>,
    config_path: &str,
    uid: usize,
) -> PyResult<&'py PyArray3<i64>> {
    let setup = Setup::from_json_file(config_path).map_err(to_py_err)?;
    let driver = RealizationDriver::new(&setup, &PeriodInterventions, &SetupDraws);
    let outcome = driver.simulate(uid).map_err(to_py_err)?;
    Ok(PyArray3::from_owned_array(py, outcome.into_tensor()))
}

/// Python module definition
#[pymodule]
fn metapop_seir(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_batch, m)?)?;
    m.add_function(wrap_pyfunction!(simulate_realization, m)?)?;
    Ok(())
}
