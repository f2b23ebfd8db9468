use std::str::FromStr;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::util::{distance_from_line, point_to_ray_distance, segments_intersect, Vec2Ext};

/// Kind of a spatial entity in the world.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    #[default]
    Agent,
    Wall,
    Attractor,
    Obstacle,
    FallenAgent,
}

impl ObjectKind {
    /// Parses a configuration type string. Unknown strings fall back to [`ObjectKind::Agent`].
    pub fn from_config(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Agent => "agent",
            ObjectKind::Wall => "wall",
            ObjectKind::Attractor => "attractor",
            ObjectKind::Obstacle => "obstacle",
            ObjectKind::FallenAgent => "fallen agent",
        }
    }

    /// Whether agents steer away from entities of this kind.
    pub fn is_repulsive(&self) -> bool {
        matches!(
            self,
            ObjectKind::Wall | ObjectKind::Obstacle | ObjectKind::FallenAgent
        )
    }
}

impl FromStr for ObjectKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(ObjectKind::Agent),
            "wall" => Ok(ObjectKind::Wall),
            "attractor" => Ok(ObjectKind::Attractor),
            "obstacle" => Ok(ObjectKind::Obstacle),
            "fallen agent" | "fallen_agent" => Ok(ObjectKind::FallenAgent),
            _ => Err(()),
        }
    }
}

/// Capabilities shared by every entity an agent can perceive.
pub trait SpatialEntity {
    fn kind(&self) -> ObjectKind;

    /// Reference position of the entity. For walls this is the start point.
    fn position(&self) -> Vec2;

    /// Orientation normal: unit length when meaningful, zero otherwise.
    fn norm(&self) -> Vec2;

    /// Whether the entity intersects the forward vision rectangle of an observer
    /// at `pos` looking along `dir`.
    fn is_visible(&self, pos: Vec2, dir: Vec2, vision_length: f32, vision_width: f32) -> bool;

    /// Offset from the nearest point of the entity to `point`.
    fn direction(&self, point: Vec2) -> Vec2;

    fn distance(&self, point: Vec2) -> f32 {
        self.direction(point).length()
    }

    fn velocity(&self) -> Vec2 {
        Vec2::ZERO
    }
}

/// Visibility test for point-like entities.
pub(crate) fn point_is_visible(
    point: Vec2,
    pos: Vec2,
    dir: Vec2,
    vision_length: f32,
    vision_width: f32,
) -> bool {
    point_to_ray_distance(point, pos, dir, vision_length) <= vision_width * 0.5
}

/// Half-plane wall. Configured walls are always built as a back-to-back pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    pub start: Vec2,
    pub end: Vec2,
    norm: Vec2,
}

impl Wall {
    pub fn new(start: Vec2, end: Vec2) -> Self {
        let norm = (end - start).tangent().normalize_eps();
        Wall { start, end, norm }
    }

    /// Builds the two opposing half-walls for a configured wall.
    pub fn pair(start: Vec2, end: Vec2) -> [Wall; 2] {
        [Wall::new(start, end), Wall::new(end, start)]
    }

    pub fn length(&self) -> f32 {
        (self.end - self.start).length()
    }

    /// Whether `point` lies on the side of the wall its normal points to.
    pub fn faces(&self, point: Vec2) -> bool {
        (point - self.start).dot(self.norm) >= 0.0
    }
}

impl SpatialEntity for Wall {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Wall
    }

    fn position(&self) -> Vec2 {
        self.start
    }

    fn norm(&self) -> Vec2 {
        self.norm
    }

    fn is_visible(&self, pos: Vec2, dir: Vec2, vision_length: f32, vision_width: f32) -> bool {
        let dir = dir.normalize_eps();
        if dir == Vec2::ZERO {
            return false;
        }

        // Either endpoint inside the rectangle.
        if point_is_visible(self.start, pos, dir, vision_length, vision_width)
            || point_is_visible(self.end, pos, dir, vision_length, vision_width)
        {
            return true;
        }

        // Otherwise the segment has to cross the centre axis or one of the long edges.
        let wall_dir = self.end - self.start;
        let wall_len = wall_dir.length();
        let offset = dir.tangent() * (vision_width * 0.5);

        [pos, pos + offset, pos - offset].into_iter().any(|origin| {
            segments_intersect(origin, dir, vision_length, self.start, wall_dir, wall_len)
        })
    }

    fn direction(&self, point: Vec2) -> Vec2 {
        distance_from_line(point, [self.start, self.end]).epsilon_snap()
    }
}

/// Point-like static entity: attractor, obstacle or fallen agent marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub kind: ObjectKind,
    pub position: Vec2,
    pub norm: Vec2,
}

impl SpatialEntity for Marker {
    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn norm(&self) -> Vec2 {
        self.norm
    }

    fn is_visible(&self, pos: Vec2, dir: Vec2, vision_length: f32, vision_width: f32) -> bool {
        point_is_visible(self.position, pos, dir, vision_length, vision_width)
    }

    fn direction(&self, point: Vec2) -> Vec2 {
        point - self.position
    }
}

/// Static object owned by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum CrowdObject {
    Wall(Wall),
    Marker(Marker),
}

impl SpatialEntity for CrowdObject {
    fn kind(&self) -> ObjectKind {
        match self {
            CrowdObject::Wall(w) => w.kind(),
            CrowdObject::Marker(m) => m.kind(),
        }
    }

    fn position(&self) -> Vec2 {
        match self {
            CrowdObject::Wall(w) => w.position(),
            CrowdObject::Marker(m) => m.position(),
        }
    }

    fn norm(&self) -> Vec2 {
        match self {
            CrowdObject::Wall(w) => w.norm(),
            CrowdObject::Marker(m) => m.norm(),
        }
    }

    fn is_visible(&self, pos: Vec2, dir: Vec2, vision_length: f32, vision_width: f32) -> bool {
        match self {
            CrowdObject::Wall(w) => w.is_visible(pos, dir, vision_length, vision_width),
            CrowdObject::Marker(m) => m.is_visible(pos, dir, vision_length, vision_width),
        }
    }

    fn direction(&self, point: Vec2) -> Vec2 {
        match self {
            CrowdObject::Wall(w) => w.direction(point),
            CrowdObject::Marker(m) => m.direction(point),
        }
    }
}

/// Index of an entity in one of the simulator arenas. Only valid within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Agent(u32),
    Object(u32),
}
