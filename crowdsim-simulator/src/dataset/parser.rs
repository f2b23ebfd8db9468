use glam::Vec2;
use serde::Deserialize;
use serde_json::Value;

use super::{DatasetError, TrajectoryPoint};

/// Samples read from a dataset text, before velocity reconstruction.
#[derive(Debug, Default)]
pub(super) struct ParsedSamples {
    pub points: Vec<TrajectoryPoint>,
    pub skipped: usize,
}

impl ParsedSamples {
    fn push(&mut self, frame: f64, agent_id: f64, position: Vec2) {
        match (as_index(frame), as_index(agent_id)) {
            (Some(frame), Some(agent_id)) if position.is_finite() => self
                .points
                .push(TrajectoryPoint::new(frame, agent_id, position)),
            _ => self.skipped += 1,
        }
    }
}

/// Frame numbers and ids are sometimes written as `780.0`.
fn as_index(value: f64) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64)
        .then_some(value as u32)
}

/// ETH/UCY rows: `frame id x y`, extra columns ignored.
pub(super) fn parse_rows(text: &str, pixel_to_meter: f32) -> ParsedSamples {
    let mut samples = ParsedSamples::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let columns: Vec<f64> = line
            .split_whitespace()
            .take(4)
            .map_while(|c| c.parse().ok())
            .collect();
        let &[frame, agent_id, x, y] = columns.as_slice() else {
            samples.skipped += 1;
            continue;
        };

        samples.push(
            frame,
            agent_id,
            Vec2::new(x as f32, y as f32) * pixel_to_meter,
        );
    }

    samples
}

#[derive(Deserialize)]
struct TrackRecord {
    #[serde(alias = "frame")]
    f: f64,
    #[serde(alias = "personId")]
    p: f64,
    x: f32,
    y: f32,
}

/// TrajNet tracks: one document with a `tracks` array, or one JSON object per line where
/// `{"track": {...}}` lines carry the samples.
pub(super) fn parse_trajnet(
    text: &str,
    pixel_to_meter: f32,
) -> Result<ParsedSamples, DatasetError> {
    let records = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut root)) if root.contains_key("tracks") => {
            match root.remove("tracks") {
                Some(Value::Array(tracks)) => tracks,
                _ => return Err(DatasetError::MissingTracks),
            }
        }
        Ok(_) => line_tracks(text)?,
        Err(err) => line_tracks(text).map_err(|_| DatasetError::Json(err))?,
    };

    if records.is_empty() {
        return Err(DatasetError::MissingTracks);
    }

    let mut samples = ParsedSamples::default();
    for record in records {
        match TrackRecord::deserialize(record) {
            Ok(r) => samples.push(r.f, r.p, Vec2::new(r.x, r.y) * pixel_to_meter),
            Err(_) => samples.skipped += 1,
        }
    }
    Ok(samples)
}

/// Collects the `track` objects of a newline-delimited document. Fails when no line is JSON.
fn line_tracks(text: &str) -> Result<Vec<Value>, DatasetError> {
    let mut parsed_any = false;
    let mut tracks = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        parsed_any = true;
        if let Value::Object(mut object) = value {
            if let Some(track) = object.remove("track") {
                tracks.push(track);
            }
        }
    }

    if parsed_any {
        Ok(tracks)
    } else {
        Err(DatasetError::MissingTracks)
    }
}
