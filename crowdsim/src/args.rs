use std::path::PathBuf;

use crowdsim_simulator::{
    models::{AvoidanceStrategy, SimulationMode},
    SimulatorOptions,
};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Mode {
    SocialForce,
    Orca,
    Dataset,
}

impl From<Mode> for SimulationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::SocialForce => SimulationMode::SocialForce,
            Mode::Orca => SimulationMode::Orca,
            Mode::Dataset => SimulationMode::DatasetPlayback,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Format {
    Eth,
    Ucy,
    Trajnet,
    Export,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Eth => "eth",
            Format::Ucy => "ucy",
            Format::Trajnet => "trajnet",
            Format::Export => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Avoidance {
    Lp,
    Repulsion,
}

#[derive(Debug, clap::Parser)]
pub struct Args {
    /// Path to scenario file (JSON, or TOML by extension)
    pub config: Option<PathBuf>,
    /// Simulation mode, overrides the scenario
    #[arg(value_enum, short, long)]
    pub mode: Option<Mode>,
    /// Trajectory dataset to load
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,
    /// Dataset format
    #[arg(value_enum, short, long)]
    pub format: Option<Format>,
    /// Number of steps to simulate
    #[arg(long)]
    pub steps: Option<u32>,
    /// Length of a step (seconds)
    #[arg(long)]
    pub timeslice: Option<f32>,
    /// Dataset frame rate (frames per second)
    #[arg(long)]
    pub frame_rate: Option<f32>,
    /// Dataset pixel to meter ratio
    #[arg(long)]
    pub pixel_to_meter: Option<f32>,
    /// Velocity selection of the ORCA mode
    #[arg(value_enum, long, default_value_t = Avoidance::Lp)]
    pub avoidance: Avoidance,
    /// Writes the loaded dataset as an export document
    #[arg(long)]
    pub export: Option<PathBuf>,
    /// Dataset to seed agents from and to evaluate against
    #[arg(long)]
    pub ground_truth: Option<PathBuf>,
    /// Max playback speed
    #[arg(short, long, default_value_t = 1.0)]
    pub speed: f32,
    /// Do not write the diagnostic log
    #[arg(long)]
    pub no_log: bool,
    /// Generates a random scenario with this many agents when no config is given
    #[arg(long)]
    pub random: Option<usize>,
}

impl Args {
    pub fn to_simulator_options(&self) -> SimulatorOptions {
        SimulatorOptions {
            avoidance: match self.avoidance {
                Avoidance::Lp => AvoidanceStrategy::LinearProgram,
                Avoidance::Repulsion => AvoidanceStrategy::Repulsion,
            },
            record_trajectories: self.ground_truth.is_some(),
        }
    }
}
