use std::{fs, path::Path};

use glam::Vec2;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::{models::SimulationMode, object::ObjectKind};

/// Errors raised while reading a scenario document.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("could not read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad JSON scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad TOML scenario: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Accepts `[x, y, ...]`; anything else becomes the zero vector.
fn lenient_vec2<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec2, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seq(Vec<f32>),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Seq(v) if v.len() >= 2 => Vec2::new(v[0], v[1]),
        _ => Vec2::ZERO,
    })
}

/// Scenario data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub steps: u32,
    pub timeslice: f32,
    pub agents: Vec<AgentConfig>,
    pub walls: Vec<WallConfig>,
    pub objects: Vec<ObjectConfig>,
    pub simulation: SimulationConfig,
    pub analysis: AnalysisConfig,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            steps: 1000,
            timeslice: 0.4,
            agents: Vec::new(),
            walls: Vec::new(),
            objects: Vec::new(),
            simulation: SimulationConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Scenario {
    /// Reads a scenario file. `.toml` files are parsed as TOML, everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            Scenario::from_toml_str(&text)
        } else {
            Scenario::from_json_str(&text)
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(text)?)
    }

    /// Reproducible crossing scenario inside a walled square of side `size`.
    pub fn random(count: usize, size: f32, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut point = || Vec2::new(rng.f32(), rng.f32()) * (size - 2.0) + Vec2::ONE;

        let agents = (0..count)
            .map(|i| {
                let position = point();
                let goal = point();
                AgentConfig {
                    id: Some(i as u32),
                    position,
                    attractor: Some(AttractorConfig::at(goal)),
                    ..Default::default()
                }
            })
            .collect();

        let corners = [
            Vec2::ZERO,
            Vec2::new(size, 0.0),
            Vec2::new(size, size),
            Vec2::new(0.0, size),
        ];
        let walls = (0..4)
            .map(|i| WallConfig {
                start: corners[i],
                end: corners[(i + 1) % 4],
            })
            .collect();

        Scenario {
            agents,
            walls,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(rename = "pos", deserialize_with = "lenient_vec2")]
    pub position: Vec2,
    #[serde(rename = "vel", deserialize_with = "lenient_vec2")]
    pub velocity: Vec2,
    #[serde(rename = "atWeight")]
    pub attractor_weight: f32,
    #[serde(rename = "waWeight")]
    pub wall_avoid_weight: f32,
    #[serde(rename = "obWeight")]
    pub obstacle_avoid_weight: f32,
    #[serde(rename = "accel")]
    pub acceleration: f32,
    #[serde(rename = "maxVel")]
    pub max_velocity: f32,
    #[serde(rename = "visDist")]
    pub vision_length: f32,
    #[serde(rename = "visWid")]
    pub vision_width: f32,
    #[serde(rename = "pspace")]
    pub personal_space: f32,
    pub radius: f32,
    pub mesh: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attractor: Option<AttractorConfig>,
    #[serde(rename = "timeHorizon")]
    pub time_horizon: f32,
    #[serde(rename = "timeHorizonObst")]
    pub obstacle_time_horizon: f32,
    #[serde(rename = "neighborDist")]
    pub neighbor_distance: f32,
    #[serde(rename = "maxNeighbors")]
    pub max_neighbor_count: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            id: None,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            attractor_weight: 0.5,
            wall_avoid_weight: 0.6,
            obstacle_avoid_weight: 0.5,
            acceleration: 0.2,
            max_velocity: 1.5,
            vision_length: 3.0,
            vision_width: 2.0,
            personal_space: 0.4,
            radius: 0.25,
            mesh: "blue.mesh".to_string(),
            attractor: None,
            time_horizon: 2.0,
            obstacle_time_horizon: 2.0,
            neighbor_distance: 10.0,
            max_neighbor_count: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttractorConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "pos", deserialize_with = "lenient_vec2")]
    pub position: Vec2,
    #[serde(deserialize_with = "lenient_vec2")]
    pub norm: Vec2,
}

impl AttractorConfig {
    pub fn at(position: Vec2) -> Self {
        AttractorConfig {
            position,
            ..Default::default()
        }
    }
}

impl Default for AttractorConfig {
    fn default() -> Self {
        AttractorConfig {
            kind: ObjectKind::Attractor.as_str().to_string(),
            position: Vec2::ZERO,
            norm: Vec2::ZERO,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    #[serde(deserialize_with = "lenient_vec2")]
    pub start: Vec2,
    #[serde(deserialize_with = "lenient_vec2")]
    pub end: Vec2,
}

/// Generic world object entry. Walls expand into two half-walls, agents into agents,
/// everything else into a point marker.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "pos", deserialize_with = "lenient_vec2")]
    pub position: Vec2,
    #[serde(deserialize_with = "lenient_vec2")]
    pub norm: Vec2,
    #[serde(deserialize_with = "lenient_vec2")]
    pub start: Vec2,
    #[serde(deserialize_with = "lenient_vec2")]
    pub end: Vec2,
}

impl ObjectConfig {
    pub fn object_kind(&self) -> ObjectKind {
        ObjectKind::from_config(&self.kind)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub mode: String,
    #[serde(rename = "timeHorizon", skip_serializing_if = "Option::is_none")]
    pub time_horizon: Option<f32>,
    #[serde(rename = "neighborDist", skip_serializing_if = "Option::is_none")]
    pub neighbor_distance: Option<f32>,
    #[serde(rename = "maxNeighbors", skip_serializing_if = "Option::is_none")]
    pub max_neighbor_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetConfig>,
    pub playback: PlaybackConfig,
}

impl SimulationConfig {
    pub fn mode(&self) -> SimulationMode {
        SimulationMode::from_config(&self.mode)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub filename: String,
    pub format: String,
    #[serde(rename = "frameRate")]
    pub frame_rate: f32,
    #[serde(rename = "pixelToMeter")]
    pub pixel_to_meter: f32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            filename: String::new(),
            format: "eth".to_string(),
            frame_rate: 2.5,
            pixel_to_meter: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub realtime: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig { realtime: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    #[serde(rename = "exportTrajectories")]
    pub export_trajectories: bool,
    #[serde(rename = "outputFile")]
    pub output_file: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            export_trajectories: false,
            output_file: "output.json".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::vec2;

    use super::*;

    #[test]
    fn test_parse_json_scenario() {
        let text = r#"{
            "steps": 20,
            "timeslice": 0.1,
            "agents": [
                { "pos": [1, 2], "vel": [0.5, 0], "maxVel": 1.2,
                  "attractor": { "type": "attractor", "pos": [10, 2], "norm": [0, 0] } }
            ],
            "walls": [ { "start": [0, 0], "end": [5, 0] } ],
            "objects": [ { "type": "obstacle", "pos": [3, 3] } ],
            "simulation": { "mode": "orca", "timeHorizon": 3.0 }
        }"#;
        let scenario = Scenario::from_json_str(text).unwrap();

        assert_eq!(scenario.steps, 20);
        assert_eq!(scenario.agents[0].position, vec2(1.0, 2.0));
        assert_eq!(scenario.agents[0].max_velocity, 1.2);
        assert_eq!(scenario.agents[0].radius, 0.25);
        assert_eq!(
            scenario.agents[0].attractor.as_ref().unwrap().position,
            vec2(10.0, 2.0)
        );
        assert_eq!(scenario.walls[0].end, vec2(5.0, 0.0));
        assert_eq!(scenario.objects[0].object_kind(), ObjectKind::Obstacle);
        assert_eq!(scenario.simulation.mode(), SimulationMode::Orca);
        assert_eq!(scenario.simulation.time_horizon, Some(3.0));
        assert!(scenario.simulation.playback.realtime);
    }

    #[test]
    fn test_malformed_vectors_become_zero() {
        let text = r#"{ "agents": [ { "pos": "nowhere", "vel": [1] } ],
                        "objects": [ { "type": "strange", "pos": null } ] }"#;
        let scenario = Scenario::from_json_str(text).unwrap();

        assert_eq!(scenario.agents[0].position, Vec2::ZERO);
        assert_eq!(scenario.agents[0].velocity, Vec2::ZERO);
        assert_eq!(scenario.objects[0].object_kind(), ObjectKind::Agent);
        assert_eq!(scenario.steps, 1000);
    }

    #[test]
    fn test_unparseable_document_is_an_error() {
        assert!(Scenario::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_parse_toml_scenario() {
        let text = r#"
            steps = 5
            timeslice = 0.2

            [[walls]]
            start = [0.0, 0.0]
            end = [0.0, 4.0]

            [simulation]
            mode = "dataset"
        "#;
        let scenario = Scenario::from_toml_str(text).unwrap();

        assert_eq!(scenario.steps, 5);
        assert_eq!(scenario.walls.len(), 1);
        assert_eq!(scenario.simulation.mode(), SimulationMode::DatasetPlayback);
    }

    #[test]
    fn test_random_scenario_is_reproducible() {
        let a = Scenario::random(8, 20.0, 7);
        let b = Scenario::random(8, 20.0, 7);

        assert_eq!(a.agents.len(), 8);
        assert_eq!(a.walls.len(), 4);
        for (a, b) in a.agents.iter().zip(&b.agents) {
            assert_eq!(a.position, b.position);
            assert!(a.position.x >= 1.0 && a.position.x <= 19.0);
        }
    }
}
