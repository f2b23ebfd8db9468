mod args;
pub mod renderer;

use std::{
    fs::{self, File},
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use args::Args;
use clap::Parser;
use crowdsim_simulator::{
    dataset::{DatasetFormat, DatasetLoader},
    diagnostic::DiagnosticLog,
    models::SimulationMode,
    scenario::Scenario,
    Simulator,
};
use log::{info, warn};

use crate::renderer::LogRenderer;

static SIG_INT: AtomicBool = AtomicBool::new(false);

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module("crowdsim", log::LevelFilter::Info)
        .init();

    if cfg!(debug_assertions) {
        warn!("Debug build");
    }

    let args = Args::parse();

    let (scenario, scenario_name) = match (&args.config, args.random) {
        (Some(path), _) => (
            Scenario::from_path(path)
                .with_context(|| format!("could not load scenario {}", path.display()))?,
            path.display().to_string(),
        ),
        (None, Some(count)) => (Scenario::random(count, 20.0, 0), format!("random_{count}")),
        (None, None) => (Scenario::default(), "empty".to_string()),
    };

    let steps = args.steps.unwrap_or(scenario.steps);
    let timeslice = args.timeslice.unwrap_or(scenario.timeslice);
    let realtime = scenario.simulation.playback.realtime;
    let dataset_config = scenario.simulation.dataset.clone().unwrap_or_default();
    let export_path = args.export.clone().or_else(|| {
        scenario
            .analysis
            .export_trajectories
            .then(|| PathBuf::from(&scenario.analysis.output_file))
    });
    let mode = args
        .mode
        .map(SimulationMode::from)
        .unwrap_or_else(|| scenario.simulation.mode());

    let frame_rate = args.frame_rate.unwrap_or(dataset_config.frame_rate);
    let pixel_to_meter = args.pixel_to_meter.unwrap_or(dataset_config.pixel_to_meter);
    let format = args
        .format
        .map(|f| f.as_str().to_string())
        .unwrap_or(dataset_config.format.clone());

    let mut simulator = Simulator::with_renderer(
        scenario,
        args.to_simulator_options(),
        Box::new(LogRenderer::default()),
    );
    simulator.set_dataset_parameters(frame_rate, pixel_to_meter);

    let dataset_path = args.dataset.clone().or_else(|| {
        (!dataset_config.filename.is_empty()).then(|| PathBuf::from(&dataset_config.filename))
    });
    if let Some(path) = &dataset_path {
        simulator
            .load_dataset(path, &format)
            .with_context(|| format!("could not load dataset {}", path.display()))?;
    }

    let ground_truth = match &args.ground_truth {
        Some(path) => {
            let mut loader = DatasetLoader::new(frame_rate, pixel_to_meter);
            loader
                .load_path(path, format.parse::<DatasetFormat>()?)
                .with_context(|| format!("could not load ground truth {}", path.display()))?;
            Some(loader)
        }
        None => None,
    };

    simulator.set_mode(mode);
    if mode == SimulationMode::DatasetPlayback && simulator.dataset().is_empty() {
        bail!("dataset playback requires a dataset (--dataset)");
    }
    if let Some(path) = &args.ground_truth {
        if mode == SimulationMode::DatasetPlayback {
            warn!("Ground truth comparison is skipped in dataset playback mode");
        } else {
            // Seed the agents with the recorded population of the first frame.
            simulator.load_dataset(path, &format)?;
            if let Some(&first_frame) = simulator.dataset().frame_numbers().first() {
                simulator.populate_from_dataset(first_frame);
            }
        }
    }

    ctrlc::set_handler(|| SIG_INT.store(true, Ordering::SeqCst))?;

    let mut diagnostic_log = DiagnosticLog::new(mode, scenario_name);
    simulator.play();
    info!("Running {steps} steps of {timeslice} s in {mode} mode");

    for _ in 0..steps {
        if SIG_INT.load(Ordering::SeqCst) {
            info!("Interrupted");
            break;
        }

        let start = Instant::now();
        let Some(step_metrics) = simulator.step(timeslice) else {
            break;
        };
        if simulator.step_count() % 100 == 0 {
            info!(
                "Step: {:6}, Active agents: {:6}",
                simulator.step_count(),
                step_metrics.active_agent_count
            );
        }
        diagnostic_log.push(step_metrics);

        if realtime {
            let step_time = Instant::now() - start;
            let min_interval = Duration::from_secs_f32(timeslice.max(0.0) / args.speed.max(1e-3));
            if step_time < min_interval {
                thread::sleep(min_interval - step_time);
            }
        }
    }
    simulator.pause();

    let stats = simulator.statistics();
    info!(
        "Finished: {} steps, {:.1} s simulated, {} agents",
        stats.step_count, stats.elapsed_time, stats.agent_count
    );

    if let Some(ground_truth) = &ground_truth {
        if mode != SimulationMode::DatasetPlayback {
            let report = simulator.compare_with_ground_truth(ground_truth);
            info!(
                "ADE: {:.3} m, FDE: {:.3} m over {} agents",
                report.mean_ade,
                report.mean_fde,
                report.agents.len()
            );
        }
    }

    if let Some(path) = &export_path {
        if mode == SimulationMode::DatasetPlayback {
            simulator.export_trajectories(path)?;
        } else {
            warn!("Trajectory export is only available in dataset playback mode");
        }
    }

    if !args.no_log {
        let current_time = chrono::Local::now();
        fs::create_dir("logs").ok();
        let log_path: PathBuf = [
            "logs",
            &current_time.format("%Y-%m-%d_%H%M%S_log.json").to_string(),
        ]
        .iter()
        .collect();
        let mut log_file = File::create(&log_path)?;

        serde_json::to_writer(&mut log_file, &diagnostic_log)?;
        info!("Exported log file: {}", log_path.display());
    }

    Ok(())
}
