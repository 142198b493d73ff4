//! One `(strategy, repetition)` unit of work: builds a fresh constellation
//! and strategy, steps the simulation `max_time_steps` times, and emits
//! output. Grounded in `original_source/main.py`'s `run()` function, with
//! the per-step sequencing itself delegated to `constellation_sim::run_step`.

use crate::failures::{self, FailureState};
use crate::output::{evaluation_data_path, EntityLogger, EvaluationRecord, EvaluationWriter};
use crate::strategies::build_strategy;
use crate::{Result, RunnerError, FAILURE_TIME, NUM_GROUNDSTATIONS, NUM_SATELLITES, RESET_TIME, START_TIME};
use constellation_nodes::{Groundstation, Satellite};
use constellation_sim::{run_step, Constellation, RunConfig};
use constellation_time::{EcefPosition, SimTime};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Job {
    pub strategy_name: String,
    pub repetition: u64,
}

/// Run-wide flags shared by every job in the sweep.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub growth_factor: f64,
    pub gsl_failures: bool,
    pub isl_failures: bool,
    pub gs_failures: bool,
    pub max_time_steps: u64,
    pub logging: bool,
    pub seed: u64,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub strategy_name: String,
    pub repetition: u64,
    pub steps_completed: u64,
}

pub fn run_job(job: &Job, options: &RunOptions) -> Result<JobOutcome> {
    let seed = options.seed + job.repetition;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut strategy = build_strategy(&job.strategy_name, seed)
        .ok_or_else(|| RunnerError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, format!("unknown strategy {}", job.strategy_name))))?;

    let mut input_source = crate::input::InputSource::new(options.input_dir.clone(), NUM_SATELLITES);
    let gs_positions = input_source.load_groundstation_positions()?;
    let attenuation = input_source.load_attenuation_table()?;

    let satellites: Vec<Satellite> = (0..NUM_SATELLITES as u32)
        .map(|id| Satellite::new(id, EcefPosition::new(0.0, 0.0, 0.0)))
        .collect();
    let groundstations: Vec<Groundstation> = gs_positions
        .iter()
        .enumerate()
        .map(|(i, &pos)| Groundstation::new((NUM_SATELLITES + i) as u32, pos, &mut rng))
        .collect();
    let n_gs = groundstations.len();
    let mut constellation = Constellation::new(satellites, groundstations);

    let config = RunConfig {
        growth_factor: options.growth_factor,
        ..RunConfig::default()
    };

    let mut writer = EvaluationWriter::create(&evaluation_data_path(
        &options.output_dir,
        &job.strategy_name,
        options.gsl_failures,
        options.isl_failures,
        options.growth_factor,
        job.repetition,
    ))?;
    let mut entity_logger = if options.logging {
        Some(EntityLogger::create(&options.output_dir, &job.strategy_name, job.repetition)?)
    } else {
        None
    };

    let start_time = SimTime::parse(START_TIME)?;
    let failure_time = SimTime::parse(FAILURE_TIME)?;
    let reset_time = SimTime::parse(RESET_TIME)?;
    let mut current_time = start_time;
    let mut failure_state = FailureState::default();

    for step in 0..options.max_time_steps {
        if step % 60 == 0 {
            tracing::info!(
                strategy = %job.strategy_name,
                repetition = job.repetition,
                time = %current_time.to_iso_string(),
                "step {}",
                step
            );
        }

        failures::update(
            &mut failure_state,
            current_time,
            failure_time,
            reset_time,
            NUM_SATELLITES,
            n_gs,
            options.isl_failures,
            options.gsl_failures,
            options.gs_failures,
            &mut rng,
        );
        let masks = failures::to_masks(&failure_state, NUM_SATELLITES, n_gs);

        let step_input = input_source.step_input(step)?;

        let metrics = run_step(
            &mut constellation,
            strategy.as_mut(),
            &attenuation,
            &step_input,
            &masks,
            current_time,
            &config,
            &mut rng,
        )?;

        if let Some(logger) = entity_logger.as_mut() {
            let time_str = current_time.to_iso_string();
            for sat in &constellation.satellites {
                logger.log_satellite(sat, &time_str)?;
            }
            for gs in &constellation.groundstations {
                logger.log_groundstation(gs, &time_str)?;
            }
        }

        writer.append(&EvaluationRecord::from_step(step, current_time.to_iso_string(), &metrics))?;

        current_time = current_time.step();
    }

    Ok(JobOutcome {
        strategy_name: job.strategy_name.clone(),
        repetition: job.repetition,
        steps_completed: options.max_time_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_inputs(dir: &std::path::Path) {
        let mut gs_positions = Vec::new();
        for i in 0..NUM_GROUNDSTATIONS {
            gs_positions.push(format!("[{}, 0.0, 0.0]", 6_378_137.0 + i as f64));
        }
        std::fs::write(
            dir.join("groundstation_positions.json"),
            format!("[{}]", gs_positions.join(",")),
        )
        .unwrap();

        let rows: Vec<String> = (0..NUM_GROUNDSTATIONS).map(|_| "[0.1,0.1,0.1,0.1]".to_string()).collect();
        std::fs::write(dir.join("atmospheric_attenuation.json"), format!("[{}]", rows.join(","))).unwrap();

        let sat_positions: Vec<String> = (0..NUM_SATELLITES).map(|i| format!("[{}, 0.0, 0.0]", 7_000_000.0 + i as f64)).collect();
        let one_step_positions = format!("[{}]", sat_positions.join(","));
        let isl: Vec<String> = (0..NUM_SATELLITES).map(|_| "[]".to_string()).collect();
        let one_step_isl = format!("[{}]", isl.join(","));
        let vis: Vec<String> = (0..NUM_SATELLITES).map(|_| "[]".to_string()).collect();
        let one_step_vis = format!("[{}]", vis.join(","));
        let gen: Vec<String> = (0..NUM_SATELLITES).map(|_| "0.0".to_string()).collect();
        let one_step_gen = format!("[{}]", gen.join(","));

        let steps_positions: Vec<&str> = vec![one_step_positions.as_str(); 1000];
        let steps_isl: Vec<&str> = vec![one_step_isl.as_str(); 1000];
        let steps_vis: Vec<&str> = vec![one_step_vis.as_str(); 1000];
        let steps_gen: Vec<&str> = vec![one_step_gen.as_str(); 1000];

        let contents = format!(
            "{{\"satellite_positions\": [{}], \"isl_neighbours\": [{}], \"visible_groundstations\": [{}], \"data_generation\": [{}]}}",
            steps_positions.join(","),
            steps_isl.join(","),
            steps_vis.join(","),
            steps_gen.join(","),
        );
        let mut f = std::fs::File::create(dir.join("step_inputs_0.json")).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn a_short_job_runs_to_completion_and_writes_output() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        write_inputs(input_dir.path());

        let job = Job {
            strategy_name: "bent_pipe".to_string(),
            repetition: 0,
        };
        let options = RunOptions {
            growth_factor: 2.0,
            gsl_failures: false,
            isl_failures: false,
            gs_failures: false,
            max_time_steps: 3,
            logging: false,
            seed: 0,
            input_dir: input_dir.path().to_path_buf(),
            output_dir: output_dir.path().to_path_buf(),
        };

        let outcome = run_job(&job, &options).unwrap();
        assert_eq!(outcome.steps_completed, 3);

        let out_path = evaluation_data_path(output_dir.path(), "bent_pipe", false, false, 2.0, 0);
        let contents = std::fs::read_to_string(out_path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }
}
