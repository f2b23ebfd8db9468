//! Recorded pedestrian trajectories: parsing, velocity reconstruction, frame
//! indexing, playback cursor and export.

mod evaluation;
mod export;
mod parser;

use std::{collections::BTreeMap, fmt, fs, path::Path, str::FromStr};

use glam::Vec2;
use log::{info, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

use crate::scenario::{AgentConfig, AttractorConfig};

pub use self::{
    evaluation::{
        average_displacement_error, final_displacement_error, AgentEvaluation, EvaluationReport,
    },
    export::{ExportDocument, ExportPoint, ExportTrajectory},
};

/// Frame rate of the ETH/UCY recordings. (frames per second)
pub const DEFAULT_FRAME_RATE: f32 = 2.5;
pub const DEFAULT_PIXEL_TO_METER: f32 = 0.05;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("could not read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad JSON dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown dataset format: {0}")]
    UnknownFormat(String),
    #[error("dataset has no tracks")]
    MissingTracks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// Whitespace separated `frame id x y` rows.
    Eth,
    Ucy,
    /// JSON track records.
    TrajNet,
    /// Document written by [`DatasetLoader::export_document`].
    Export,
}

impl FromStr for DatasetFormat {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eth" => Ok(DatasetFormat::Eth),
            "ucy" => Ok(DatasetFormat::Ucy),
            "trajnet" => Ok(DatasetFormat::TrajNet),
            "export" => Ok(DatasetFormat::Export),
            _ => Err(DatasetError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetFormat::Eth => "eth",
            DatasetFormat::Ucy => "ucy",
            DatasetFormat::TrajNet => "trajnet",
            DatasetFormat::Export => "export",
        })
    }
}

/// One recorded sample. Positions are in meters, velocities in meters per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub frame: u32,
    pub agent_id: u32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl TrajectoryPoint {
    pub fn new(frame: u32, agent_id: u32, position: Vec2) -> Self {
        TrajectoryPoint {
            frame,
            agent_id,
            x: position.x,
            y: position.y,
            vx: 0.0,
            vy: 0.0,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.vx, self.vy)
    }
}

/// Frame-ascending samples of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTrajectory {
    pub agent_id: u32,
    pub points: Vec<TrajectoryPoint>,
    /// Time of the first sample. (seconds)
    pub start_time: f32,
    /// Time of the last sample. (seconds)
    pub end_time: f32,
}

impl AgentTrajectory {
    pub fn positions(&self) -> Vec<Vec2> {
        self.points.iter().map(TrajectoryPoint::position).collect()
    }

    pub fn last_point(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }
}

/// Summary of a loaded dataset.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DatasetStatistics {
    pub agent_count: usize,
    pub frame_count: usize,
    pub point_count: usize,
    pub first_frame: u32,
    pub last_frame: u32,
    pub frame_rate: f32,
    pub pixel_to_meter: f32,
    /// (seconds)
    pub duration: f32,
    /// Mean number of samples per agent.
    pub mean_trajectory_length: f32,
}

/// Loaded trajectories with a per-frame index and a playback cursor.
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    frame_rate: f32,
    pixel_to_meter: f32,
    /// Ordered by agent id.
    trajectories: Vec<AgentTrajectory>,
    frames: FxHashMap<u32, Vec<TrajectoryPoint>>,
    /// Sorted recorded frame numbers.
    frame_numbers: Vec<u32>,
    cursor: usize,
    skipped_rows: usize,
}

impl Default for DatasetLoader {
    fn default() -> Self {
        DatasetLoader::new(DEFAULT_FRAME_RATE, DEFAULT_PIXEL_TO_METER)
    }
}

impl DatasetLoader {
    pub fn new(frame_rate: f32, pixel_to_meter: f32) -> Self {
        let mut loader = DatasetLoader {
            frame_rate: DEFAULT_FRAME_RATE,
            pixel_to_meter: DEFAULT_PIXEL_TO_METER,
            trajectories: Vec::new(),
            frames: FxHashMap::default(),
            frame_numbers: Vec::new(),
            cursor: 0,
            skipped_rows: 0,
        };
        loader.set_parameters(frame_rate, pixel_to_meter);
        loader
    }

    /// Sets the parameters used by the next load. Non-positive values are ignored.
    pub fn set_parameters(&mut self, frame_rate: f32, pixel_to_meter: f32) {
        if frame_rate.is_finite() && frame_rate > 0.0 {
            self.frame_rate = frame_rate;
        } else {
            warn!("Ignored invalid frame rate: {frame_rate}");
        }
        if pixel_to_meter.is_finite() && pixel_to_meter > 0.0 {
            self.pixel_to_meter = pixel_to_meter;
        } else {
            warn!("Ignored invalid pixel to meter ratio: {pixel_to_meter}");
        }
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn pixel_to_meter(&self) -> f32 {
        self.pixel_to_meter
    }

    pub fn load_path(
        &mut self,
        path: impl AsRef<Path>,
        format: DatasetFormat,
    ) -> Result<(), DatasetError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        self.load_str(&text, format)?;
        info!("Loaded dataset: {}", path.display());
        Ok(())
    }

    /// Replaces the loaded data with the samples parsed from `text`.
    ///
    /// On error the previously loaded data is kept.
    pub fn load_str(&mut self, text: &str, format: DatasetFormat) -> Result<(), DatasetError> {
        let parsed = match format {
            DatasetFormat::Eth | DatasetFormat::Ucy => {
                parser::parse_rows(text, self.pixel_to_meter)
            }
            DatasetFormat::TrajNet => parser::parse_trajnet(text, self.pixel_to_meter)?,
            DatasetFormat::Export => {
                let document: ExportDocument = serde_json::from_str(text)?;
                self.set_parameters(document.frame_rate, document.pixel_to_meter);
                document.into_parsed()
            }
        };

        if parsed.skipped > 0 {
            warn!("Skipped {} malformed dataset records", parsed.skipped);
        }
        self.skipped_rows = parsed.skipped;
        self.build(parsed.points);

        let stats = self.statistics();
        info!(
            "Dataset ({format}): {} agents, {} frames, {:.1} s",
            stats.agent_count, stats.frame_count, stats.duration
        );
        Ok(())
    }

    fn build(&mut self, points: Vec<TrajectoryPoint>) {
        let mut by_agent: BTreeMap<u32, Vec<TrajectoryPoint>> = BTreeMap::new();
        for point in points {
            by_agent.entry(point.agent_id).or_default().push(point);
        }

        self.trajectories = by_agent
            .into_iter()
            .map(|(agent_id, mut points)| {
                points.sort_by_key(|p| p.frame);
                reconstruct_velocities(&mut points, self.frame_rate);
                AgentTrajectory {
                    agent_id,
                    start_time: points[0].frame as f32 / self.frame_rate,
                    end_time: points[points.len() - 1].frame as f32 / self.frame_rate,
                    points,
                }
            })
            .collect();

        self.frames.clear();
        for point in self.trajectories.iter().flat_map(|t| t.points.iter()) {
            self.frames.entry(point.frame).or_default().push(*point);
        }
        self.frame_numbers = self.frames.keys().copied().collect();
        self.frame_numbers.sort_unstable();
        self.cursor = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn trajectories(&self) -> &[AgentTrajectory] {
        &self.trajectories
    }

    pub fn trajectory(&self, agent_id: u32) -> Option<&AgentTrajectory> {
        self.trajectories
            .binary_search_by_key(&agent_id, |t| t.agent_id)
            .ok()
            .map(|i| &self.trajectories[i])
    }

    /// Recorded frame numbers in ascending order.
    pub fn frame_numbers(&self) -> &[u32] {
        &self.frame_numbers
    }

    pub fn frame_data(&self, frame: u32) -> &[TrajectoryPoint] {
        self.frames.get(&frame).map_or(&[], Vec::as_slice)
    }

    pub fn active_agents(&self, frame: u32) -> Vec<u32> {
        self.frame_data(frame).iter().map(|p| p.agent_id).collect()
    }

    pub fn agent_point(&self, agent_id: u32, frame: u32) -> Option<&TrajectoryPoint> {
        self.frame_data(frame).iter().find(|p| p.agent_id == agent_id)
    }

    pub fn is_agent_active(&self, agent_id: u32, frame: u32) -> bool {
        self.agent_point(agent_id, frame).is_some()
    }

    /// Number of malformed records skipped by the last load.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    // Playback cursor

    /// Frame the next call to [`Self::next_frame`] returns.
    pub fn current_frame(&self) -> Option<u32> {
        self.frame_numbers.get(self.cursor).copied()
    }

    pub fn has_next_frame(&self) -> bool {
        self.cursor < self.frame_numbers.len()
    }

    pub fn next_frame(&mut self) -> Option<u32> {
        let frame = self.current_frame()?;
        self.cursor += 1;
        Some(frame)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn statistics(&self) -> DatasetStatistics {
        let (Some(&first_frame), Some(&last_frame)) =
            (self.frame_numbers.first(), self.frame_numbers.last())
        else {
            return DatasetStatistics {
                frame_rate: self.frame_rate,
                pixel_to_meter: self.pixel_to_meter,
                ..Default::default()
            };
        };

        let point_count: usize = self.trajectories.iter().map(|t| t.points.len()).sum();
        DatasetStatistics {
            agent_count: self.trajectories.len(),
            frame_count: self.frame_numbers.len(),
            point_count,
            first_frame,
            last_frame,
            frame_rate: self.frame_rate,
            pixel_to_meter: self.pixel_to_meter,
            duration: (last_frame - first_frame) as f32 / self.frame_rate,
            mean_trajectory_length: point_count as f32 / self.trajectories.len() as f32,
        }
    }

    /// Agent configuration reproducing `point`, heading for the agent's next recorded sample.
    pub fn agent_config_for(&self, point: &TrajectoryPoint) -> AgentConfig {
        let attractor = self.trajectory(point.agent_id).and_then(|trajectory| {
            let index = trajectory.points.iter().position(|p| p.frame == point.frame)?;
            trajectory
                .points
                .get(index + 1)
                .map(|next| AttractorConfig::at(next.position()))
        });

        AgentConfig {
            id: Some(point.agent_id),
            position: point.position(),
            velocity: point.velocity(),
            attractor,
            ..Default::default()
        }
    }

    pub fn export_document(&self) -> ExportDocument {
        ExportDocument::from_loader(self)
    }

    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let text = serde_json::to_string_pretty(&self.export_document())?;
        fs::write(path.as_ref(), text)?;
        info!("Exported dataset: {}", path.as_ref().display());
        Ok(())
    }
}

/// Finite-difference velocities over real elapsed time: forward at the first sample,
/// backward at the last, central elsewhere. Zero elapsed time gives zero velocity.
pub fn reconstruct_velocities(points: &mut [TrajectoryPoint], frame_rate: f32) {
    let len = points.len();
    if len < 2 {
        for point in points.iter_mut() {
            point.vx = 0.0;
            point.vy = 0.0;
        }
        return;
    }

    for i in 0..len {
        let (before, after) = match i {
            0 => (0, 1),
            _ if i == len - 1 => (i - 1, i),
            _ => (i - 1, i + 1),
        };
        let (a, b) = (points[before], points[after]);
        let elapsed = b.frame.saturating_sub(a.frame) as f32 / frame_rate;
        let velocity = if elapsed > 0.0 {
            (b.position() - a.position()) / elapsed
        } else {
            Vec2::ZERO
        };
        points[i].vx = velocity.x;
        points[i].vy = velocity.y;
    }
}
