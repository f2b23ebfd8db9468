//! Optimal reciprocal collision avoidance.
//!
//! Half-planes are expressed in velocity space: a velocity `v` satisfies the line
//! when `det(direction, point - v) <= 0`, i.e. it lies on the left of the directed line.
//! The linear programs follow the RVO2 formulation.

use std::{str::FromStr, time::Instant};

use glam::Vec2;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    agent::Agent,
    diagnostic::StepMetrics,
    object::{CrowdObject, SpatialEntity},
    util::{distance_from_line, Vec2Ext},
};

use super::{MotionModel, World};

const RVO_EPSILON: f32 = 1e-5;

/// How the new velocity is selected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvoidanceStrategy {
    /// Half-plane constraints solved by the 2D linear program.
    #[default]
    LinearProgram,
    /// Inverse-distance repulsion blended with the goal direction.
    Repulsion,
}

impl FromStr for AvoidanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lp" | "linear_program" => Ok(AvoidanceStrategy::LinearProgram),
            "repulsion" => Ok(AvoidanceStrategy::Repulsion),
            _ => Err(format!("unknown avoidance strategy: {s}")),
        }
    }
}

/// Directed half-plane constraint in velocity space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrcaLine {
    pub point: Vec2,
    pub direction: Vec2,
}

impl OrcaLine {
    /// Positive when `velocity` lies on the forbidden side.
    #[inline]
    pub fn violation(&self, velocity: Vec2) -> f32 {
        self.direction.cross(self.point - velocity)
    }
}

/// ORCA velocity selection followed by direct integration.
#[derive(Debug, Default, Clone)]
pub struct OrcaModel {
    pub strategy: AvoidanceStrategy,
}

impl OrcaModel {
    pub fn new(strategy: AvoidanceStrategy) -> Self {
        OrcaModel { strategy }
    }

    /// New velocity of `agents[index]`, computed from the given snapshot.
    pub fn compute_velocity(
        &self,
        agents: &[Agent],
        objects: &[CrowdObject],
        index: usize,
        delta_time: f32,
    ) -> Vec2 {
        let agent = &agents[index];
        let velocity = match self.strategy {
            AvoidanceStrategy::LinearProgram => {
                let (lines, obstacle_lines) =
                    compute_orca_lines(agents, objects, index, delta_time);
                solve_velocity(
                    &lines,
                    obstacle_lines,
                    agent.max_velocity,
                    agent.preferred_velocity(),
                )
            }
            AvoidanceStrategy::Repulsion => repulsion_velocity(agents, index),
        };

        if velocity.is_finite() {
            velocity.clamp_length_max(agent.max_velocity)
        } else {
            Vec2::ZERO
        }
    }
}

impl MotionModel for OrcaModel {
    fn update_states(&self, world: &mut World, delta_time: f32, metrics: &mut StepMetrics) {
        let instant = Instant::now();
        let agents = &world.agents;
        let objects = &world.objects;
        let velocities: Vec<Vec2> = (0..agents.len())
            .into_par_iter()
            .map(|i| self.compute_velocity(agents, objects, i, delta_time))
            .collect();
        metrics.time_decision = instant.elapsed().as_secs_f64();

        let instant = Instant::now();
        for (agent, velocity) in world.agents.iter_mut().zip(velocities) {
            agent.velocity = velocity;
            agent.position = agent.position.add_scaled(velocity, delta_time);
        }
        metrics.time_integration = instant.elapsed().as_secs_f64();
    }
}

/// Builds the constraints of `agents[index]`: wall lines first, then agent lines.
///
/// Returns the lines and the number of leading wall lines.
pub fn compute_orca_lines(
    agents: &[Agent],
    objects: &[CrowdObject],
    index: usize,
    delta_time: f32,
) -> (Vec<OrcaLine>, usize) {
    let agent = &agents[index];
    let settings = agent.orca;
    let inv_dt = if delta_time > RVO_EPSILON {
        delta_time.recip()
    } else {
        RVO_EPSILON.recip()
    };

    let mut lines = Vec::new();

    // Walls, with the full responsibility on the agent.
    let obstacle_range = settings.obstacle_time_horizon * agent.max_velocity + agent.radius;
    for object in objects {
        let CrowdObject::Wall(wall) = object else {
            continue;
        };
        if !wall.faces(agent.position) || wall.distance(agent.position) >= obstacle_range {
            continue;
        }
        let closest = agent.position - distance_from_line(agent.position, [wall.start, wall.end]);
        lines.push(agent_line(
            (agent.position, agent.velocity, agent.radius),
            (closest, Vec2::ZERO, 0.0),
            settings.obstacle_time_horizon,
            inv_dt,
            1.0,
        ));
    }
    let obstacle_lines = lines.len();

    // Nearest agents; the stable sort keeps insertion order among equal distances.
    let range_sq = settings.neighbor_distance * settings.neighbor_distance;
    let mut neighbors: Vec<(f32, usize)> = agents
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != index)
        .map(|(i, other)| ((other.position - agent.position).length_squared(), i))
        .filter(|&(dist_sq, _)| dist_sq < range_sq)
        .collect();
    neighbors.sort_by_key(|&(dist_sq, _)| OrderedFloat(dist_sq));
    neighbors.truncate(settings.max_neighbor_count);

    for (_, i) in neighbors {
        let other = &agents[i];
        lines.push(agent_line(
            (agent.position, agent.velocity, agent.radius),
            (other.position, other.velocity, other.radius),
            settings.time_horizon,
            inv_dt,
            0.5,
        ));
    }

    (lines, obstacle_lines)
}

/// Half-plane that agent `a` must respect to avoid `b`, both given as
/// `(position, velocity, radius)`. `responsibility` is the share of the
/// required velocity change taken by `a`.
pub fn agent_line(
    (pos_a, vel_a, radius_a): (Vec2, Vec2, f32),
    (pos_b, vel_b, radius_b): (Vec2, Vec2, f32),
    time_horizon: f32,
    inv_dt: f32,
    responsibility: f32,
) -> OrcaLine {
    let relative_position = pos_b - pos_a;
    let relative_velocity = vel_a - vel_b;
    let dist_sq = relative_position.length_squared();
    let combined_radius = radius_a + radius_b;
    let combined_radius_sq = combined_radius * combined_radius;
    let inv_time_horizon = time_horizon.max(RVO_EPSILON).recip();

    let direction;
    let u;

    if dist_sq > combined_radius_sq {
        // No collision yet.
        let w = relative_velocity - relative_position * inv_time_horizon;
        let w_length_sq = w.length_squared();
        let dot = w.dot(relative_position);

        if dot < 0.0 && dot * dot > combined_radius_sq * w_length_sq {
            // Project on the cut-off circle.
            let w_length = w_length_sq.sqrt();
            let unit_w = w / w_length;
            direction = Vec2::new(unit_w.y, -unit_w.x);
            u = (combined_radius * inv_time_horizon - w_length) * unit_w;
        } else {
            // Project on the nearer leg.
            let leg = (dist_sq - combined_radius_sq).sqrt();
            direction = if relative_position.cross(w) > 0.0 {
                Vec2::new(
                    relative_position.x * leg - relative_position.y * combined_radius,
                    relative_position.x * combined_radius + relative_position.y * leg,
                ) / dist_sq
            } else {
                -Vec2::new(
                    relative_position.x * leg + relative_position.y * combined_radius,
                    -relative_position.x * combined_radius + relative_position.y * leg,
                ) / dist_sq
            };
            u = relative_velocity.dot(direction) * direction - relative_velocity;
        }
    } else {
        // Already overlapping: resolve within one tick.
        let w = relative_velocity - relative_position * inv_dt;
        let w_length = w.length();
        let unit_w = if w_length > RVO_EPSILON {
            w / w_length
        } else if dist_sq > RVO_EPSILON * RVO_EPSILON {
            -relative_position.normalize()
        } else {
            Vec2::X
        };
        direction = Vec2::new(unit_w.y, -unit_w.x);
        u = (combined_radius * inv_dt - w_length) * unit_w;
    }

    OrcaLine {
        point: vel_a + responsibility * u,
        direction,
    }
}

/// Velocity closest to `preferred` inside all half-planes and the speed disk.
///
/// The first `obstacle_lines` lines are never relaxed when the program is infeasible.
pub fn solve_velocity(
    lines: &[OrcaLine],
    obstacle_lines: usize,
    max_speed: f32,
    preferred: Vec2,
) -> Vec2 {
    let mut result = Vec2::ZERO;
    let line_fail = linear_program2(lines, max_speed, preferred, false, &mut result);
    if line_fail < lines.len() {
        linear_program3(lines, obstacle_lines, line_fail, max_speed, &mut result);
    }

    // Projected lines far from the origin lose precision in lp1.
    if result.is_finite() {
        result.clamp_length_max(max_speed)
    } else {
        Vec2::ZERO
    }
}

/// Optimizes along line `line_no` subject to lines `0..line_no` and the speed disk.
fn linear_program1(
    lines: &[OrcaLine],
    line_no: usize,
    radius: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
    result: &mut Vec2,
) -> bool {
    let line = &lines[line_no];
    let dot = line.point.dot(line.direction);
    let discriminant = dot * dot + radius * radius - line.point.length_squared();
    if discriminant < 0.0 {
        // The speed disk misses this line entirely.
        return false;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot - sqrt_discriminant;
    let mut t_right = -dot + sqrt_discriminant;

    for other in &lines[..line_no] {
        let denominator = line.direction.cross(other.direction);
        let numerator = other.direction.cross(line.point - other.point);

        if denominator.abs() <= RVO_EPSILON {
            // Parallel lines.
            if numerator < 0.0 {
                return false;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }

        if t_left > t_right {
            return false;
        }
    }

    let t = if direction_opt {
        if opt_velocity.dot(line.direction) > 0.0 {
            t_right
        } else {
            t_left
        }
    } else {
        line.direction
            .dot(opt_velocity - line.point)
            .clamp(t_left, t_right)
    };
    *result = line.point + t * line.direction;

    true
}

/// Incremental 2D program. Returns the index of the first line that could not be
/// satisfied, or `lines.len()` on success.
fn linear_program2(
    lines: &[OrcaLine],
    radius: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
    result: &mut Vec2,
) -> usize {
    *result = if direction_opt {
        // `opt_velocity` is a unit direction here.
        opt_velocity * radius
    } else {
        opt_velocity.clamp_length_max(radius)
    };

    for i in 0..lines.len() {
        if lines[i].violation(*result) > 0.0 {
            let previous = *result;
            if !linear_program1(lines, i, radius, opt_velocity, direction_opt, result) {
                *result = previous;
                return i;
            }
        }
    }

    lines.len()
}

/// Relaxation for infeasible programs: minimizes the largest violation of the agent
/// lines from `begin_line` on, keeping the first `obstacle_lines` lines hard.
fn linear_program3(
    lines: &[OrcaLine],
    obstacle_lines: usize,
    begin_line: usize,
    radius: f32,
    result: &mut Vec2,
) {
    let mut distance = 0.0;

    for i in begin_line..lines.len() {
        if lines[i].violation(*result) <= distance {
            continue;
        }

        let mut projected: Vec<OrcaLine> = lines[..obstacle_lines.min(i)].to_vec();
        for j in obstacle_lines..i {
            let determinant = lines[i].direction.cross(lines[j].direction);
            let point = if determinant.abs() <= RVO_EPSILON {
                if lines[i].direction.dot(lines[j].direction) > 0.0 {
                    // Same direction.
                    continue;
                }
                0.5 * (lines[i].point + lines[j].point)
            } else {
                let t = lines[j].direction.cross(lines[i].point - lines[j].point) / determinant;
                lines[i].point + t * lines[i].direction
            };
            projected.push(OrcaLine {
                point,
                direction: (lines[j].direction - lines[i].direction).normalize_eps(),
            });
        }

        let previous = *result;
        let opt_direction = Vec2::new(-lines[i].direction.y, lines[i].direction.x);
        if linear_program2(&projected, radius, opt_direction, true, result) < projected.len() {
            // Only possible through floating point error; keep the previous result.
            *result = previous;
        }

        distance = lines[i].violation(*result);
    }
}

/// Fallback used when the linear program is disabled.
fn repulsion_velocity(agents: &[Agent], index: usize) -> Vec2 {
    let agent = &agents[index];
    let goal_direction = agent.preferred_velocity().normalize_eps();

    let mut avoidance = Vec2::ZERO;
    let mut count = 0;
    for (i, other) in agents.iter().enumerate() {
        if i == index {
            continue;
        }
        let distance = agent.distance(other.position);
        if distance < agent.orca.neighbor_distance && distance > 0.1 {
            let away = (agent.position - other.position).normalize_eps();
            avoidance += away / (distance + 0.1);
            count += 1;
        }
    }

    let velocity = if count > 0 {
        0.5 * goal_direction + 0.5 * avoidance.normalize_eps()
    } else {
        goal_direction
    };

    let speed = velocity.length();
    if speed > 0.001 {
        velocity / speed * speed.min(agent.max_velocity)
    } else {
        velocity
    }
}
