//! Daily long-format export of completed trajectories.
//!
//! The state tensor is downsampled to one column per simulated day and
//! laid out as one row per (date, compartment label) with one column per
//! node, followed by a `diffI` row of daily incidence.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use ndarray::{s, Array3};

use crate::compartment::{Compartment, RowLabel};
use crate::config::Setup;
use crate::error::Result;
use crate::seir::TimeGrid;

/// One (date, label) row with a value per node.
#[derive(Clone, Debug, PartialEq)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub label: RowLabel,
    pub values: Vec<i64>,
}

/// Long-format table of a single trajectory.
#[derive(Clone, Debug, PartialEq)]
pub struct DailyTable {
    pub node_names: Vec<String>,
    pub rows: Vec<DailyRow>,
}

impl DailyTable {
    /// Reshape a (compartment, node, timestep) tensor into daily rows.
    ///
    /// `diffI` is the first difference of cumI, zero on the first day.
    pub fn from_states(
        states: &Array3<i64>,
        grid: &TimeGrid,
        start_date: NaiveDate,
        node_names: &[String],
    ) -> Self {
        let cum_index = Compartment::CumulativeIncidence.index();
        let mut rows = Vec::with_capacity((grid.n_days + 1) * RowLabel::COUNT);
        let mut previous: Option<Vec<i64>> = None;

        for day in 0..=grid.n_days {
            let date = start_date + Duration::days(day as i64);
            let column = states.slice(s![.., .., day * grid.steps_per_day]);

            let cumulative = column.row(cum_index).to_vec();
            let daily: Vec<i64> = match &previous {
                Some(prev) => cumulative.iter().zip(prev).map(|(now, before)| now - before).collect(),
                None => vec![0; cumulative.len()],
            };

            for label in RowLabel::all() {
                let values = match label {
                    RowLabel::Compartment(c) => column.row(c.index()).to_vec(),
                    RowLabel::DailyIncidence => daily.clone(),
                };
                rows.push(DailyRow {
                    date,
                    label,
                    values,
                });
            }
            previous = Some(cumulative);
        }

        Self {
            node_names: node_names.to_vec(),
            rows,
        }
    }

    /// Write as CSV with header `time,comp,<node names>`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec!["time".to_string(), "comp".to_string()];
        header.extend(self.node_names.iter().cloned());
        out.write_record(&header)?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(row.values.len() + 2);
            record.push(row.date.format("%Y-%m-%d").to_string());
            record.push(row.label.label().to_string());
            record.extend(row.values.iter().map(|v| v.to_string()));
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }
}

/// Persistence collaborator for completed trajectories.
pub trait TrajectorySink: Sync {
    /// Store `table` under a realization-unique `file_id`; returns its location.
    fn persist(&self, table: &DailyTable, file_id: &str) -> Result<PathBuf>;
}

/// Writes `{data_dir}/{timestamp}_{setup_name}_{file_id}.csv`.
#[derive(Clone, Debug)]
pub struct CsvSink {
    data_dir: PathBuf,
    prefix: String,
}

impl CsvSink {
    pub fn new(data_dir: impl Into<PathBuf>, timestamp: &str, setup_name: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            prefix: format!("{timestamp}_{setup_name}"),
        }
    }

    pub fn for_setup(setup: &Setup) -> Self {
        Self::new(setup.data_dir.clone(), &setup.timestamp, &setup.name)
    }
}

impl TrajectorySink for CsvSink {
    fn persist(&self, table: &DailyTable, file_id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(format!("{}_{}.csv", self.prefix, file_id));
        table.write_csv(File::create(&path)?)?;
        Ok(path)
    }
}
