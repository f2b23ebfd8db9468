use glam::Vec2;
use thin_vec::ThinVec;

use crate::{
    object::{point_is_visible, EntityRef, ObjectKind, SpatialEntity},
    scenario::AgentConfig,
    util::{Vec2Ext, MY_EPSILON},
};

/// Parameters used only by the ORCA model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrcaSettings {
    /// Look-ahead time against other agents. (seconds)
    pub time_horizon: f32,
    /// Look-ahead time against walls. (seconds)
    pub obstacle_time_horizon: f32,
    /// Agents further away than this are ignored. (meters)
    pub neighbor_distance: f32,
    pub max_neighbor_count: usize,
}

impl Default for OrcaSettings {
    fn default() -> Self {
        OrcaSettings {
            time_horizon: 2.0,
            obstacle_time_horizon: 2.0,
            neighbor_distance: 10.0,
            max_neighbor_count: 10,
        }
    }
}

/// Entities seen or touched by an agent during the current tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Perception {
    pub visible: ThinVec<EntityRef>,
    pub colliding: ThinVec<EntityRef>,
}

impl Perception {
    pub fn clear(&mut self) {
        self.visible.clear();
        self.colliding.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.colliding.is_empty()
    }

    pub fn is_colliding(&self, entity: EntityRef) -> bool {
        self.colliding.contains(&entity)
    }

    /// Every perceived entity once, visible ones first.
    pub fn neighbors(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.visible.iter().copied().chain(
            self.colliding
                .iter()
                .copied()
                .filter(|e| !self.visible.contains(e)),
        )
    }
}

/// Agent instance
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub max_velocity: f32,
    pub goal: Option<Vec2>,
    pub radius: f32,
    pub personal_space: f32,
    pub vision_length: f32,
    pub vision_width: f32,
    pub attractor_weight: f32,
    /// Scales the repulsion from neighbouring agents.
    pub wall_avoid_weight: f32,
    /// Scales the repulsion from walls and obstacles.
    pub obstacle_avoid_weight: f32,
    pub acceleration: f32,
    /// Visual style tag handed to the renderer.
    pub style: String,
    pub orca: OrcaSettings,

    pub(crate) perception: Perception,
    pub(crate) force: Vec2,
}

impl Default for Agent {
    fn default() -> Self {
        Agent::from_config(&AgentConfig::default(), 0)
    }
}

impl Agent {
    /// Builds an agent from its configuration. `fallback_id` is used when the
    /// configuration carries no id.
    pub fn from_config(config: &AgentConfig, fallback_id: u32) -> Self {
        Agent {
            id: config.id.unwrap_or(fallback_id),
            position: config.position,
            velocity: config.velocity,
            max_velocity: config.max_velocity.max(0.0),
            goal: config.attractor.as_ref().map(|a| a.position),
            radius: config.radius.max(0.0),
            personal_space: config.personal_space.max(0.0),
            vision_length: config.vision_length,
            vision_width: config.vision_width,
            attractor_weight: config.attractor_weight,
            wall_avoid_weight: config.wall_avoid_weight,
            obstacle_avoid_weight: config.obstacle_avoid_weight,
            acceleration: config.acceleration,
            style: config.mesh.clone(),
            orca: OrcaSettings {
                time_horizon: config.time_horizon,
                obstacle_time_horizon: config.obstacle_time_horizon,
                neighbor_distance: config.neighbor_distance,
                max_neighbor_count: config.max_neighbor_count,
            },
            perception: Perception::default(),
            force: Vec2::ZERO,
        }
    }

    /// Facing direction: the current velocity, else the goal direction, else +X.
    pub fn heading(&self) -> Vec2 {
        let heading = self.velocity.normalize_eps();
        if heading != Vec2::ZERO {
            return heading;
        }

        match self.goal.map(|g| (g - self.position).normalize_eps()) {
            Some(dir) if dir != Vec2::ZERO => dir,
            _ => Vec2::X,
        }
    }

    /// Velocity of magnitude `max_velocity` toward the goal, zero at the goal or without one.
    pub fn preferred_velocity(&self) -> Vec2 {
        let Some(goal) = self.goal else {
            return Vec2::ZERO;
        };

        let offset = goal - self.position;
        if offset.length() <= MY_EPSILON {
            Vec2::ZERO
        } else {
            offset.normalize_eps() * self.max_velocity
        }
    }

    /// Whether `entity` lies inside this agent's vision rectangle.
    pub fn check_visible(&self, entity: &impl SpatialEntity) -> bool {
        entity.is_visible(
            self.position,
            self.heading(),
            self.vision_length,
            self.vision_width,
        )
    }

    /// Whether `entity`, of radius `other_radius`, intrudes into this agent's personal space.
    pub fn check_collide(&self, entity: &impl SpatialEntity, other_radius: f32) -> bool {
        entity.distance(self.position) < self.radius + other_radius + self.personal_space
    }

    pub fn perception(&self) -> &Perception {
        &self.perception
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    /// Clears the per-tick perception and force.
    pub fn reset(&mut self) {
        self.perception.clear();
        self.force = Vec2::ZERO;
    }
}

impl SpatialEntity for Agent {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Agent
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn norm(&self) -> Vec2 {
        self.heading()
    }

    fn is_visible(&self, pos: Vec2, dir: Vec2, vision_length: f32, vision_width: f32) -> bool {
        point_is_visible(self.position, pos, dir, vision_length, vision_width)
    }

    fn direction(&self, point: Vec2) -> Vec2 {
        point - self.position
    }

    fn velocity(&self) -> Vec2 {
        self.velocity
    }
}
