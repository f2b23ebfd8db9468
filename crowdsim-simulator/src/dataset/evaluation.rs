use std::collections::BTreeMap;

use glam::Vec2;
use serde::Serialize;

use super::DatasetLoader;

/// Mean distance over the overlapping prefix. Zero when either side is empty.
pub fn average_displacement_error(predicted: &[Vec2], ground_truth: &[Vec2]) -> f32 {
    let len = predicted.len().min(ground_truth.len());
    if len == 0 {
        return 0.0;
    }

    let total: f32 = predicted
        .iter()
        .zip(ground_truth)
        .map(|(p, g)| p.distance(*g))
        .sum();
    total / len as f32
}

/// Distance between the last points. Zero when either side is empty.
pub fn final_displacement_error(predicted: &[Vec2], ground_truth: &[Vec2]) -> f32 {
    match (predicted.last(), ground_truth.last()) {
        (Some(p), Some(g)) => p.distance(*g),
        _ => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvaluation {
    pub agent_id: u32,
    pub ade: f32,
    pub fde: f32,
    /// Number of paired samples.
    pub compared_points: usize,
}

/// Per-agent displacement errors of simulated trajectories against recorded ones.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub agents: Vec<AgentEvaluation>,
    /// Simulated agents without a recorded trajectory.
    pub unmatched: Vec<u32>,
    pub mean_ade: f32,
    pub mean_fde: f32,
}

impl EvaluationReport {
    /// Compares `predicted` positions per agent id with the ground truth. Recorded
    /// samples before `start_frame` are ignored.
    pub fn compare(
        predicted: &BTreeMap<u32, Vec<Vec2>>,
        ground_truth: &DatasetLoader,
        start_frame: Option<u32>,
    ) -> Self {
        let mut report = EvaluationReport::default();

        for (&agent_id, positions) in predicted {
            let Some(trajectory) = ground_truth.trajectory(agent_id) else {
                report.unmatched.push(agent_id);
                continue;
            };

            let truth: Vec<Vec2> = trajectory
                .points
                .iter()
                .filter(|p| start_frame.map_or(true, |start| p.frame >= start))
                .map(|p| p.position())
                .collect();

            report.agents.push(AgentEvaluation {
                agent_id,
                ade: average_displacement_error(positions, &truth),
                fde: final_displacement_error(positions, &truth),
                compared_points: positions.len().min(truth.len()),
            });
        }

        if !report.agents.is_empty() {
            let count = report.agents.len() as f32;
            report.mean_ade = report.agents.iter().map(|a| a.ade).sum::<f32>() / count;
            report.mean_fde = report.agents.iter().map(|a| a.fde).sum::<f32>() / count;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use assert_float_eq::*;
    use glam::vec2;

    use super::*;
    use crate::dataset::DatasetFormat;

    #[test]
    fn test_identical_trajectories() {
        let path = [vec2(0.0, 0.0), vec2(1.0, 0.5), vec2(2.0, 1.0)];
        assert_float_absolute_eq!(average_displacement_error(&path, &path), 0.0);
        assert_float_absolute_eq!(final_displacement_error(&path, &path), 0.0);
    }

    #[test]
    fn test_constant_offset() {
        let truth = [vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(2.0, 0.0)];
        let predicted: Vec<Vec2> = truth.iter().map(|p| *p + vec2(3.0, 4.0)).collect();

        assert_float_absolute_eq!(average_displacement_error(&predicted, &truth), 5.0, 1e-5);
        assert_float_absolute_eq!(final_displacement_error(&predicted, &truth), 5.0, 1e-5);
    }

    #[test]
    fn test_different_lengths_and_empty() {
        let truth = [vec2(0.0, 0.0), vec2(1.0, 0.0), vec2(2.0, 0.0)];
        let predicted = [vec2(0.0, 1.0), vec2(1.0, 1.0)];

        // prefix of two points, each one meter off
        assert_float_absolute_eq!(average_displacement_error(&predicted, &truth), 1.0, 1e-5);
        // (1, 1) against (2, 0)
        assert_float_absolute_eq!(
            final_displacement_error(&predicted, &truth),
            2.0f32.sqrt(),
            1e-5
        );
        assert_float_absolute_eq!(average_displacement_error(&[], &truth), 0.0);
        assert_float_absolute_eq!(final_displacement_error(&predicted, &[]), 0.0);
    }

    #[test]
    fn test_report() {
        let mut loader = DatasetLoader::new(1.0, 1.0);
        loader
            .load_str("0 1 0 0\n1 1 1 0\n2 1 2 0\n", DatasetFormat::Eth)
            .unwrap();

        let mut predicted = BTreeMap::new();
        predicted.insert(1, vec![vec2(1.0, 1.0), vec2(2.0, 1.0)]);
        predicted.insert(8, vec![Vec2::ZERO]);

        let report = EvaluationReport::compare(&predicted, &loader, Some(1));
        assert_eq!(report.unmatched, vec![8]);
        assert_eq!(report.agents.len(), 1);
        assert_eq!(report.agents[0].compared_points, 2);
        assert_float_absolute_eq!(report.mean_ade, 1.0, 1e-5);
        assert_float_absolute_eq!(report.mean_fde, 1.0, 1e-5);
    }
}
