//! Run a batch of metapopulation SEIR realizations from a JSON setup.
//!
//! ```bash
//! cargo run --release --bin seir-batch -- --config setup.json --jobs 8
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use metapop_seir::{
    run_parallel, CsvSink, PeriodInterventions, RealizationDriver, Setup, SetupConfig,
    SetupDraws, TrajectorySink,
};

#[derive(Parser, Debug)]
#[command(name = "seir-batch")]
#[command(about = "Stochastic metapopulation SEIR batch runner")]
struct Args {
    /// JSON setup file
    #[arg(short, long)]
    config: PathBuf,

    /// Number of parallel workers (1 = sequential)
    #[arg(short, long, default_value = "1")]
    jobs: usize,

    /// Override the number of realizations
    #[arg(long)]
    nsim: Option<usize>,

    /// Override the base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Do not write trajectories even if the setup asks for it
    #[arg(long)]
    no_export: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let mut config = SetupConfig::from_json_file(&args.config)
        .with_context(|| format!("reading setup {}", args.config.display()))?;
    if let Some(nsim) = args.nsim {
        config.nsim = nsim;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.no_export {
        config.write_csv = false;
    }
    let setup = Setup::new(config).context("invalid setup")?;

    info!(
        "Setup '{}': {} nodes, {} mobility edges, {} days at dt = {}, {} realizations on {} worker(s)",
        setup.name,
        setup.n_nodes(),
        setup.mobility.edges().len(),
        setup.grid.n_days,
        setup.grid.dt,
        setup.nsim,
        args.jobs
    );
    if let Some(filter) = &setup.dynamic_filter {
        info!("Dynamic filter constrains the first {} days", filter.n_days());
    }
    if setup.write_csv {
        info!("Writing trajectories to {}", setup.data_dir.display());
    }

    let sink = CsvSink::for_setup(&setup);
    let driver = RealizationDriver::new(&setup, &PeriodInterventions, &SetupDraws)
        .with_sink(setup.write_csv.then_some(&sink as &dyn TrajectorySink));
    let summary = run_parallel(&driver, args.jobs)?;

    info!(
        "{} completed, {} rejected",
        summary.completed, summary.rejected
    );
    Ok(())
}
