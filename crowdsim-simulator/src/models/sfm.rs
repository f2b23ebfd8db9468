use std::time::Instant;

use glam::Vec2;
use rayon::prelude::*;

use crate::{
    agent::{Agent, Perception},
    diagnostic::StepMetrics,
    object::{CrowdObject, EntityRef, SpatialEntity},
    util::{Vec2Ext, MY_EPSILON},
};

use super::{MotionModel, World};

/// Repulsion from entities inside the personal space counts this many times.
const COLLISION_WEIGHT: f32 = 2.0;
/// Upper bound for the exponent of the repulsive potentials.
const MAX_EXPONENT: f32 = 10.0;

/// Force-based steering: goal attraction plus repulsion from agents and obstacles.
#[derive(Debug, Default, Clone)]
pub struct SocialForceModel;

impl MotionModel for SocialForceModel {
    fn update_states(&self, world: &mut World, delta_time: f32, metrics: &mut StepMetrics) {
        let instant = Instant::now();
        let perceptions = perceive(&world.agents, &world.objects);
        for (agent, perception) in world.agents.iter_mut().zip(perceptions) {
            agent.perception = perception;
        }
        metrics.time_perception = instant.elapsed().as_secs_f64();

        let instant = Instant::now();
        let forces = calc_forces(&world.agents, &world.objects);
        for (agent, force) in world.agents.iter_mut().zip(forces) {
            agent.force = force;
        }
        metrics.time_decision = instant.elapsed().as_secs_f64();

        let instant = Instant::now();
        for agent in world.agents.iter_mut() {
            let velocity = agent
                .velocity
                .add_scaled(agent.force, agent.acceleration * delta_time);
            agent.velocity = velocity.clamp_length_max(agent.max_velocity);
            agent.position = agent.position.add_scaled(agent.velocity, delta_time);
            agent.reset();
        }
        metrics.time_integration = instant.elapsed().as_secs_f64();
    }
}

/// Collects what every agent sees and touches. Reads only the given snapshot.
pub fn perceive(agents: &[Agent], objects: &[CrowdObject]) -> Vec<Perception> {
    agents
        .par_iter()
        .enumerate()
        .map(|(id, agent)| {
            let mut perception = Perception::default();

            for (i, other) in agents.iter().enumerate() {
                if i == id {
                    continue;
                }
                let entity = EntityRef::Agent(i as u32);
                if agent.check_visible(other) {
                    perception.visible.push(entity);
                }
                if agent.check_collide(other, other.radius) {
                    perception.colliding.push(entity);
                }
            }

            for (i, object) in objects.iter().enumerate() {
                let entity = EntityRef::Object(i as u32);
                if agent.check_visible(object) {
                    perception.visible.push(entity);
                }
                if agent.check_collide(object, 0.0) {
                    perception.colliding.push(entity);
                }
            }

            perception
        })
        .collect()
}

/// Calculates the steering force of every agent from its current perception.
pub fn calc_forces(agents: &[Agent], objects: &[CrowdObject]) -> Vec<Vec2> {
    agents
        .par_iter()
        .map(|agent| {
            let mut force = Vec2::ZERO;
            let personal_space = agent.personal_space.max(MY_EPSILON);

            // Calculate force from the destination.
            if let Some(goal) = agent.goal {
                let desired = (goal - agent.position).normalize_eps() * agent.max_velocity;
                force += agent.attractor_weight * (desired - agent.velocity);
            }

            for entity in agent.perception.neighbors() {
                let weight = if agent.perception.is_colliding(entity) {
                    COLLISION_WEIGHT
                } else {
                    1.0
                };

                match entity {
                    // Calculate force from other agents.
                    EntityRef::Agent(i) => {
                        let other = &agents[i as usize];
                        let difference = agent.position - other.position;
                        let gap = difference.length() - (agent.radius + other.radius);
                        let direction = difference.normalize_eps();
                        let strength = (-gap / personal_space).min(MAX_EXPONENT).exp();
                        force += weight * agent.wall_avoid_weight * strength * direction;
                    }
                    // Calculate force from obstacles.
                    EntityRef::Object(i) => {
                        let object = &objects[i as usize];
                        if !object.kind().is_repulsive() {
                            continue;
                        }
                        if let CrowdObject::Wall(wall) = object {
                            if !wall.faces(agent.position) {
                                continue;
                            }
                        }
                        let difference = object.direction(agent.position);
                        let gap = difference.length() - agent.radius;
                        let direction = difference.normalize_eps();
                        let strength = (-gap / personal_space).min(MAX_EXPONENT).exp();
                        force += weight * agent.obstacle_avoid_weight * strength * direction;
                    }
                }
            }

            force
        })
        .collect()
}
