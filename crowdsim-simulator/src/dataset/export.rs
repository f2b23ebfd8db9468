use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{parser::ParsedSamples, DatasetLoader, TrajectoryPoint};
use crate::scenario::AgentConfig;

/// Self-describing dataset document that can be loaded back with the `export` format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Number of recorded frames.
    pub steps: usize,
    /// Time between two frames. (seconds)
    pub timeslice: f32,
    pub frame_rate: f32,
    pub pixel_to_meter: f32,
    /// Agents of the first recorded frame.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    pub trajectories: Vec<ExportTrajectory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTrajectory {
    pub agent_id: u32,
    pub start_time: f32,
    pub end_time: f32,
    pub points: Vec<ExportPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExportPoint {
    pub frame: u32,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub vx: f32,
    #[serde(default)]
    pub vy: f32,
}

impl ExportDocument {
    pub(super) fn from_loader(loader: &DatasetLoader) -> Self {
        let agents = loader
            .frame_numbers()
            .first()
            .map(|&frame| {
                loader
                    .frame_data(frame)
                    .iter()
                    .map(|p| loader.agent_config_for(p))
                    .collect()
            })
            .unwrap_or_default();

        let trajectories = loader
            .trajectories()
            .iter()
            .map(|t| ExportTrajectory {
                agent_id: t.agent_id,
                start_time: t.start_time,
                end_time: t.end_time,
                points: t
                    .points
                    .iter()
                    .map(|p| ExportPoint {
                        frame: p.frame,
                        x: p.x,
                        y: p.y,
                        vx: p.vx,
                        vy: p.vy,
                    })
                    .collect(),
            })
            .collect();

        ExportDocument {
            steps: loader.frame_numbers().len(),
            timeslice: loader.frame_rate().recip(),
            frame_rate: loader.frame_rate(),
            pixel_to_meter: loader.pixel_to_meter(),
            agents,
            trajectories,
        }
    }

    /// Samples of the document. Positions are already in meters.
    pub(super) fn into_parsed(self) -> ParsedSamples {
        let points = self
            .trajectories
            .into_iter()
            .flat_map(|t| {
                t.points
                    .into_iter()
                    .map(move |p| TrajectoryPoint::new(p.frame, t.agent_id, Vec2::new(p.x, p.y)))
            })
            .collect();

        ParsedSamples { points, skipped: 0 }
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;

    use crate::dataset::{DatasetFormat, DatasetLoader};

    #[test]
    fn test_two_frame_export() {
        let mut loader = DatasetLoader::new(1.0, 1.0);
        loader.load_str("0 1 0 0\n1 1 1 0\n", DatasetFormat::Eth).unwrap();

        let document = loader.export_document();
        assert_eq!(document.steps, 2);
        assert_float_absolute_eq!(document.timeslice, 1.0);
        assert_eq!(document.agents.len(), 1);
        assert_eq!(document.trajectories.len(), 1);

        let trajectory = &document.trajectories[0];
        assert_eq!(trajectory.agent_id, 1);
        assert_float_absolute_eq!(trajectory.start_time, 0.0);
        assert_float_absolute_eq!(trajectory.end_time, 1.0);
        assert_float_absolute_eq!(trajectory.points[0].vx, 1.0);

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["frameRate"], 1.0);
        assert_eq!(json["trajectories"][0]["agentId"], 1);
        assert_eq!(json["trajectories"][0]["points"][1]["frame"], 1);
        assert_eq!(json["agents"][0]["atWeight"], 0.5);
        assert_eq!(json["agents"][0]["attractor"]["type"], "attractor");
    }

    #[test]
    fn test_export_reloads() {
        let mut loader = DatasetLoader::new(2.0, 0.1);
        loader
            .load_str("0 1 0 0\n2 1 10 0\n4 1 20 0\n2 2 5 5\n", DatasetFormat::Eth)
            .unwrap();
        let text = serde_json::to_string(&loader.export_document()).unwrap();

        let mut reloaded = DatasetLoader::default();
        reloaded.load_str(&text, DatasetFormat::Export).unwrap();

        assert_float_absolute_eq!(reloaded.frame_rate(), 2.0);
        assert_eq!(reloaded.statistics(), loader.statistics());
        for (a, b) in loader.trajectories().iter().zip(reloaded.trajectories()) {
            assert_eq!(a.agent_id, b.agent_id);
            for (p, q) in a.points.iter().zip(&b.points) {
                assert_float_absolute_eq!(p.x, q.x, 1e-6);
                assert_float_absolute_eq!(p.vx, q.vx, 1e-5);
            }
        }
    }
}
