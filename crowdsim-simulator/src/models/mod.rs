mod orca;
mod sfm;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{agent::Agent, diagnostic::StepMetrics, object::CrowdObject};

pub use self::{
    orca::{
        agent_line, compute_orca_lines, solve_velocity, AvoidanceStrategy, OrcaLine, OrcaModel,
    },
    sfm::{calc_forces, perceive, SocialForceModel},
};

/// Agents and static objects shared by every model.
#[derive(Debug, Default)]
pub struct World {
    pub agents: Vec<Agent>,
    pub objects: Vec<CrowdObject>,
}

pub trait MotionModel: Send + Sync {
    /// Advances every agent by one tick. All decisions are taken from the pre-tick
    /// state before any agent is moved.
    fn update_states(&self, world: &mut World, delta_time: f32, metrics: &mut StepMetrics);
}

/// Active simulation mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    SocialForce,
    Orca,
    DatasetPlayback,
}

impl SimulationMode {
    /// Parses the mode string of a scenario. Unknown or empty strings select social force.
    pub fn from_config(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for SimulationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social_force" | "social-force" | "original" => Ok(SimulationMode::SocialForce),
            "orca" => Ok(SimulationMode::Orca),
            "dataset" | "dataset_playback" => Ok(SimulationMode::DatasetPlayback),
            _ => Err(format!("unknown simulation mode: {s}")),
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SimulationMode::SocialForce => "Social Force",
            SimulationMode::Orca => "ORCA",
            SimulationMode::DatasetPlayback => "Dataset Playback",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SimulationMode;

    #[test]
    fn test_mode_from_config() {
        assert_eq!(SimulationMode::from_config("orca"), SimulationMode::Orca);
        assert_eq!(
            SimulationMode::from_config("dataset"),
            SimulationMode::DatasetPlayback
        );
        assert_eq!(
            SimulationMode::from_config("original"),
            SimulationMode::SocialForce
        );
        assert_eq!(SimulationMode::from_config(""), SimulationMode::SocialForce);
        assert!("warp".parse::<SimulationMode>().is_err());
    }
}
