//! Batch configuration.
//!
//! [`SetupConfig`] is the deserialized form; [`Setup`] is the validated,
//! immutable view shared read-only by every realization of a batch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crate::draws::{ParameterConfig, SeedingEntry, SeedingMethod};
use crate::error::{Result, SeirError};
use crate::filter::DynamicFilter;
use crate::mobility::{MobilityEdge, MobilityGraph, MobilitySampling};
use crate::npi::InterventionPeriod;
use crate::seir::TimeGrid;

const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

fn default_setup_name() -> String {
    "seir".to_string()
}

fn default_dt() -> f64 {
    0.25
}

fn default_nsim() -> usize {
    1
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("model_output")
}

/// Configuration of a batch, as read from JSON.
#[derive(Clone, Debug, Deserialize)]
pub struct SetupConfig {
    #[serde(default = "default_setup_name")]
    pub setup_name: String,
    pub node_names: Vec<String>,
    pub populations: Vec<u64>,
    /// Inline mobility edges, by node index.
    #[serde(default)]
    pub mobility: Vec<MobilityEdge>,
    /// CSV edge list (`ori,dest,amount`) merged with `mobility`.
    #[serde(default)]
    pub mobility_file: Option<PathBuf>,
    #[serde(default)]
    pub mobility_sampling: MobilitySampling,
    /// Timestep in days; `1 / dt` must be a whole number.
    #[serde(default = "default_dt")]
    pub dt: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default = "default_nsim")]
    pub nsim: usize,
    /// Base seed; realizations draw from OS entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub write_csv: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub parameters: ParameterConfig,
    #[serde(default)]
    pub seeding: Vec<SeedingEntry>,
    #[serde(default)]
    pub seeding_method: SeedingMethod,
    #[serde(default)]
    pub interventions: Vec<InterventionPeriod>,
    /// Minimum cumulative incidence, one row per day, one column per node.
    #[serde(default)]
    pub dynamic_filter: Option<Vec<Vec<f64>>>,
}

impl SetupConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Independent random streams of one realization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RngStream {
    Parameters = 1,
    Seeding = 2,
    Epidemic = 3,
}

/// Validated batch setup.
#[derive(Clone, Debug)]
pub struct Setup {
    pub name: String,
    pub node_names: Vec<String>,
    pub populations: Vec<u64>,
    pub mobility: MobilityGraph,
    pub sampling: MobilitySampling,
    pub grid: TimeGrid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub nsim: usize,
    pub seed: Option<u64>,
    pub write_csv: bool,
    pub data_dir: PathBuf,
    /// Batch timestamp used in output file names.
    pub timestamp: String,
    pub parameters: ParameterConfig,
    pub seeding: Vec<SeedingEntry>,
    pub seeding_method: SeedingMethod,
    pub interventions: Vec<InterventionPeriod>,
    pub dynamic_filter: Option<DynamicFilter>,
    node_lookup: HashMap<String, usize>,
}

impl Setup {
    /// Validate a configuration. Every check runs before any realization.
    pub fn new(config: SetupConfig) -> Result<Self> {
        let n_nodes = config.node_names.len();
        if n_nodes == 0 {
            return Err(SeirError::config("at least one node is required"));
        }
        if config.populations.len() != n_nodes {
            return Err(SeirError::config(format!(
                "{} populations given for {} nodes",
                config.populations.len(),
                n_nodes
            )));
        }
        if let Some(i) = config.populations.iter().position(|&p| p == 0) {
            return Err(SeirError::config(format!(
                "node '{}' has zero population",
                config.node_names[i]
            )));
        }

        let mut node_lookup = HashMap::with_capacity(n_nodes);
        for (i, name) in config.node_names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(SeirError::config(format!("node {i} has an empty name")));
            }
            if node_lookup.insert(name.clone(), i).is_some() {
                return Err(SeirError::config(format!("duplicate node name '{name}'")));
            }
        }

        if config.end_date < config.start_date {
            return Err(SeirError::config(format!(
                "end date {} precedes start date {}",
                config.end_date, config.start_date
            )));
        }
        let n_days = (config.end_date - config.start_date).num_days() as usize;
        let grid = TimeGrid::new(config.dt, n_days)?;

        let mut edges = config.mobility;
        if let Some(path) = &config.mobility_file {
            edges.extend(MobilityGraph::read_edges_csv(path)?);
        }
        let mobility = MobilityGraph::new(n_nodes, edges)?;

        let dynamic_filter = config
            .dynamic_filter
            .as_deref()
            .map(|rows| DynamicFilter::from_rows(rows, n_nodes))
            .transpose()?;

        config.parameters.validate()?;

        for entry in &config.seeding {
            if !node_lookup.contains_key(&entry.node) {
                return Err(SeirError::UnknownNode(entry.node.clone()));
            }
            if !entry.amount.is_finite() || entry.amount < 0.0 {
                return Err(SeirError::config(format!(
                    "seeding amount {} for '{}' is invalid",
                    entry.amount, entry.node
                )));
            }
        }

        for period in &config.interventions {
            period.validate()?;
            for name in period.nodes.iter().flatten() {
                if !node_lookup.contains_key(name) {
                    return Err(SeirError::UnknownNode(name.clone()));
                }
            }
        }

        Ok(Self {
            name: config.setup_name,
            node_names: config.node_names,
            populations: config.populations,
            mobility,
            sampling: config.mobility_sampling,
            grid,
            start_date: config.start_date,
            end_date: config.end_date,
            nsim: config.nsim,
            seed: config.seed,
            write_csv: config.write_csv,
            data_dir: config.data_dir,
            timestamp: chrono::Local::now().format("%Y.%m.%d.%H.%M.%S").to_string(),
            parameters: config.parameters,
            seeding: config.seeding,
            seeding_method: config.seeding_method,
            interventions: config.interventions,
            dynamic_filter,
            node_lookup,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(SetupConfig::from_json_file(path)?)
    }

    pub fn n_nodes(&self) -> usize {
        self.node_names.len()
    }

    pub fn node_index(&self, name: &str) -> Result<usize> {
        self.node_lookup
            .get(name)
            .copied()
            .ok_or_else(|| SeirError::UnknownNode(name.to_string()))
    }

    /// Day offset of `date`, if it falls inside the simulated span.
    pub fn day_index(&self, date: NaiveDate) -> Option<usize> {
        let day = (date - self.start_date).num_days();
        (0..=self.grid.n_days as i64)
            .contains(&day)
            .then_some(day as usize)
    }

    /// Random stream for one realization.
    ///
    /// Parameter and seeding streams are always deterministic in
    /// (seed, uid, stream), with seed 0 when no base seed is set, so a uid
    /// names the same draws on every run. The epidemic stream is also
    /// deterministic under a base seed; without one it comes from OS entropy.
    pub fn realization_rng(&self, uid: usize, stream: RngStream) -> StdRng {
        match (self.seed, stream) {
            (None, RngStream::Epidemic) => StdRng::from_entropy(),
            (seed, stream) => StdRng::seed_from_u64(
                seed.unwrap_or(0)
                    .wrapping_add(uid as u64)
                    .wrapping_mul(STREAM_STRIDE)
                    .wrapping_add(stream as u64),
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rand::Rng;

    /// Two nodes, ten days at quarter-day steps, fixed seed.
    pub(crate) fn test_config() -> SetupConfig {
        SetupConfig {
            setup_name: "test".to_string(),
            node_names: vec!["a".to_string(), "b".to_string()],
            populations: vec![1000, 500],
            mobility: vec![MobilityEdge {
                origin: 0,
                destination: 1,
                rate: 20.0,
            }],
            mobility_file: None,
            mobility_sampling: MobilitySampling::Independent,
            dt: 0.25,
            start_date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 3, 11).unwrap(),
            nsim: 4,
            seed: Some(42),
            write_csv: false,
            data_dir: PathBuf::from("model_output"),
            parameters: ParameterConfig::default(),
            seeding: Vec::new(),
            seeding_method: SeedingMethod::Poisson,
            interventions: Vec::new(),
            dynamic_filter: None,
        }
    }

    #[test]
    fn test_valid_setup() {
        let setup = Setup::new(test_config()).unwrap();
        assert_eq!(setup.n_nodes(), 2);
        assert_eq!(setup.grid.n_days, 10);
        assert_eq!(setup.grid.n_steps(), 41);
        assert_eq!(setup.node_index("b").unwrap(), 1);
        assert!(setup.node_index("z").is_err());
    }

    #[test]
    fn test_day_index_bounds() {
        let setup = Setup::new(test_config()).unwrap();
        assert_eq!(setup.day_index(setup.start_date), Some(0));
        assert_eq!(setup.day_index(setup.end_date), Some(10));
        assert_eq!(setup.day_index(setup.end_date + Duration::days(1)), None);
        assert_eq!(setup.day_index(setup.start_date - Duration::days(1)), None);
    }

    #[test]
    fn test_rejects_invalid_configs() {
        let mut c = test_config();
        c.populations = vec![1000];
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.populations = vec![1000, 0];
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.node_names = vec!["a".to_string(), "a".to_string()];
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.node_names = vec!["a".to_string(), " ".to_string()];
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.dt = -0.25;
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.end_date = c.start_date - Duration::days(1);
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.mobility.push(MobilityEdge {
            origin: 1,
            destination: 5,
            rate: 1.0,
        });
        assert!(matches!(Setup::new(c), Err(SeirError::EdgeOutOfRange { .. })));

        let mut c = test_config();
        c.dynamic_filter = Some(vec![vec![0.0]]);
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.parameters.r0 = [3.0, 2.0];
        assert!(Setup::new(c).is_err());

        let mut c = test_config();
        c.seeding.push(SeedingEntry {
            node: "nowhere".to_string(),
            date: c.start_date,
            amount: 1.0,
        });
        assert!(matches!(Setup::new(c), Err(SeirError::UnknownNode(_))));
    }

    #[test]
    fn test_realization_streams() {
        let setup = Setup::new(test_config()).unwrap();
        let draw = |uid, stream| setup.realization_rng(uid, stream).gen::<u64>();

        assert_eq!(draw(3, RngStream::Epidemic), draw(3, RngStream::Epidemic));
        assert_ne!(draw(3, RngStream::Epidemic), draw(4, RngStream::Epidemic));
        assert_ne!(draw(3, RngStream::Epidemic), draw(3, RngStream::Seeding));
    }

    #[test]
    fn test_unseeded_draw_streams_follow_uid() {
        let mut config = test_config();
        config.seed = None;
        let setup = Setup::new(config).unwrap();
        let draw = |uid, stream| setup.realization_rng(uid, stream).gen::<u64>();

        assert_eq!(draw(7, RngStream::Seeding), draw(7, RngStream::Seeding));
        assert_eq!(draw(7, RngStream::Parameters), draw(7, RngStream::Parameters));
        assert_ne!(draw(7, RngStream::Seeding), draw(8, RngStream::Seeding));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "setup_name": "demo",
            "node_names": ["x", "y"],
            "populations": [100, 200],
            "mobility": [{"origin": 0, "destination": 1, "rate": 5.0}],
            "mobility_sampling": "multinomial",
            "dt": 0.5,
            "start_date": "2020-02-01",
            "end_date": "2020-02-15",
            "parameters": {"r0": [2.5, 2.5]},
            "seeding": [{"node": "y", "date": "2020-02-02", "amount": 3}],
            "seeding_method": "exact",
            "interventions": [{"start": "2020-02-05", "end": "2020-02-10", "reduction": 0.4}],
            "dynamic_filter": [[0, 0], [1, 0]]
        }"#;
        let config: SetupConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.nsim, 1);
        assert_eq!(config.mobility_sampling, MobilitySampling::Multinomial);
        assert_eq!(config.parameters.r0, [2.5, 2.5]);
        assert_eq!(config.parameters.sigma, ParameterConfig::default().sigma);

        let setup = Setup::new(config).unwrap();
        assert_eq!(setup.grid.steps_per_day, 2);
        assert_eq!(setup.dynamic_filter.as_ref().map(|f| f.n_days()), Some(2));
        assert_eq!(setup.seeding_method, SeedingMethod::Exact);
    }
}
