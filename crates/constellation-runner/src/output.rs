//! Output emission: one JSON-lines record per step, named the way
//! `main.py::save_evaluation_data` names its pickle files, plus optional
//! per-entity CSV logging matching `Satellite::logging`/
//! `Groundstation::logging`'s semicolon-delimited row format.

use crate::Result;
use constellation_metrics::StepMetrics;
use constellation_nodes::{Groundstation, Satellite};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Field order matches `save_evaluation_data`'s dict, not alphabetical.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub episode: u64,
    pub time: String,
    pub avg_delay: f64,
    pub drop_rate: f64,
    pub generation_rate: f64,
    pub throughput: f64,
    pub avg_hops: f64,
    pub main_link_out: f64,
    pub cost: f64,
}

impl EvaluationRecord {
    pub fn from_step(episode: u64, time: String, metrics: &StepMetrics) -> Self {
        Self {
            episode,
            time,
            avg_delay: metrics.avg_delay,
            drop_rate: metrics.drop_rate,
            generation_rate: metrics.generation_rate,
            throughput: metrics.throughput,
            avg_hops: metrics.avg_hops,
            main_link_out: metrics.main_link_out_share,
            cost: metrics.cost,
        }
    }
}

pub fn evaluation_data_path(
    output_dir: &Path,
    strategy_name: &str,
    gsl_failures: bool,
    isl_failures: bool,
    growth_factor: f64,
    repetition: u64,
) -> PathBuf {
    output_dir.join(format!(
        "evaluation_data_{}_{}_{}_{:.1}_{}.jsonl",
        strategy_name, gsl_failures as u8, isl_failures as u8, growth_factor, repetition
    ))
}

pub struct EvaluationWriter {
    writer: BufWriter<File>,
}

impl EvaluationWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, record: &EvaluationRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Per-(strategy, repetition) CSV logger mirroring `satellite.py`/
/// `groundstation.py`'s `logging` methods. Separate files per job (rather
/// than one shared file appended across the whole sweep, as the original
/// does) since jobs run concurrently and must not interleave writes.
pub struct EntityLogger {
    satellites: BufWriter<File>,
    groundstations: BufWriter<File>,
}

impl EntityLogger {
    pub fn create(output_dir: &Path, strategy_name: &str, repetition: u64) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let sat_path = output_dir.join(format!("log_satellites_{}_{}.csv", strategy_name, repetition));
        let gs_path = output_dir.join(format!("log_groundstations_{}_{}.csv", strategy_name, repetition));

        let mut satellites = BufWriter::new(OpenOptions::new().create(true).append(true).open(sat_path)?);
        let mut groundstations = BufWriter::new(OpenOptions::new().create(true).append(true).open(gs_path)?);

        writeln!(
            satellites,
            "time;id;position;neighbours;target_ids;generation_rate;outgoing_throughputs;incoming_streams;outgoing_streams;delay;drop_rate;cost"
        )?;
        writeln!(
            groundstations,
            "time;id;position;outgoing_throughput;incoming_streams;outgoing_streams;delay;drop_rate"
        )?;

        Ok(Self {
            satellites,
            groundstations,
        })
    }

    pub fn log_satellite(&mut self, sat: &Satellite, time: &str) -> Result<()> {
        let outgoing_throughputs: std::collections::BTreeMap<u32, i64> = sat
            .outgoing_throughputs
            .iter()
            .map(|(k, v)| (*k, v.round() as i64))
            .collect();
        let incoming_streams: std::collections::BTreeMap<String, i64> = sat
            .incoming_streams
            .iter()
            .map(|(k, v)| (format!("{:?}", k), v.iter().map(|s| s.rate).sum::<f64>().round() as i64))
            .collect();
        let outgoing_streams: std::collections::BTreeMap<u32, i64> = sat
            .outgoing_streams
            .iter()
            .map(|(k, v)| (*k, v.iter().map(|s| s.rate).sum::<f64>().round() as i64))
            .collect();

        writeln!(
            self.satellites,
            "{};{};({:.4}, {:.4}, {:.4});{:?};{:?};{};{};{};{};{:.2};{:.2};{:.2}",
            time,
            sat.id,
            sat.position.x,
            sat.position.y,
            sat.position.z,
            sat.isl_connections,
            sat.target_ids,
            sat.generation_rate.round(),
            serde_json::to_string(&outgoing_throughputs)?,
            serde_json::to_string(&incoming_streams)?,
            serde_json::to_string(&outgoing_streams)?,
            sat.delay,
            sat.drop_rate,
            sat.cost,
        )?;
        Ok(())
    }

    pub fn log_groundstation(&mut self, gs: &Groundstation, time: &str) -> Result<()> {
        let incoming_streams: std::collections::BTreeMap<u32, i64> = gs
            .incoming_streams
            .iter()
            .map(|(k, v)| (*k, v.iter().map(|s| s.rate).sum::<f64>().round() as i64))
            .collect();
        let outgoing_total: i64 = gs.outgoing_core.iter().map(|s| s.rate).sum::<f64>().round() as i64;

        writeln!(
            self.groundstations,
            "{};{};({:.4}, {:.4}, {:.4});{};{};{};{};{}",
            time,
            gs.id,
            gs.position.x,
            gs.position.y,
            gs.position.z,
            gs.outgoing_throughput,
            serde_json::to_string(&incoming_streams)?,
            outgoing_total,
            gs.delay,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_data_path_matches_reference_naming_scheme() {
        let path = evaluation_data_path(Path::new("results"), "ucb", true, false, 2.0, 3);
        assert_eq!(
            path,
            PathBuf::from("results/evaluation_data_ucb_1_0_2.0_3.jsonl")
        );
    }
}
