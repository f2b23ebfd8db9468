pub mod agent;
pub mod dataset;
pub mod diagnostic;
pub mod models;
pub mod object;
pub mod render;
pub mod scenario;
pub mod util;

use std::{collections::BTreeMap, fs::File, io::BufWriter, path::Path, time::Instant};

use glam::Vec2;
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use agent::Agent;
use dataset::{DatasetError, DatasetFormat, DatasetLoader, DatasetStatistics, EvaluationReport};
use diagnostic::StepMetrics;
use models::{AvoidanceStrategy, MotionModel, OrcaModel, SimulationMode, SocialForceModel, World};
use object::{CrowdObject, Marker, ObjectKind, Wall};
use render::{EntityHandle, NullRenderer, RenderSink};
use scenario::{AgentConfig, Scenario};
use util::Vec2Ext;

pub const WALL_STYLE: &str = "wall.mesh";

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("trajectory export requires dataset playback mode")]
    NotInDatasetMode,
    #[error("could not write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Simulator options.
#[derive(Debug, Default, Clone)]
pub struct SimulatorOptions {
    /// Velocity selection used in ORCA mode.
    pub avoidance: AvoidanceStrategy,
    /// Whether agent positions are recorded after every simulated tick.
    pub record_trajectories: bool,
}

/// ORCA parameters applied on top of each agent's own configuration.
#[derive(Debug, Default, Clone, Copy)]
struct OrcaOverrides {
    time_horizon: Option<f32>,
    neighbor_distance: Option<f32>,
    max_neighbor_count: Option<usize>,
}

impl OrcaOverrides {
    fn apply(&self, agent: &mut Agent) {
        if let Some(time_horizon) = self.time_horizon {
            agent.orca.time_horizon = time_horizon;
        }
        if let Some(neighbor_distance) = self.neighbor_distance {
            agent.orca.neighbor_distance = neighbor_distance;
        }
        if let Some(max_neighbor_count) = self.max_neighbor_count {
            agent.orca.max_neighbor_count = max_neighbor_count;
        }
    }
}

/// Summary of the simulator state.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatistics {
    pub mode: SimulationMode,
    pub elapsed_time: f64,
    pub step_count: usize,
    pub agent_count: usize,
    pub object_count: usize,
    pub current_frame: Option<u32>,
    pub dataset: Option<DatasetStatistics>,
}

/// Simulator instance.
pub struct Simulator {
    pub scenario: Scenario,
    pub options: SimulatorOptions,
    world: World,
    mode: SimulationMode,
    model: Option<Box<dyn MotionModel>>,
    playing: bool,
    elapsed_time: f64,
    step_count: usize,
    dataset: DatasetLoader,
    orca_overrides: OrcaOverrides,
    renderer: Box<dyn RenderSink>,
    next_handle: u64,
    recorded: BTreeMap<u32, Vec<Vec2>>,
    recording_start_frame: Option<u32>,
}

impl Simulator {
    pub fn from_scenario(scenario: Scenario, options: SimulatorOptions) -> Self {
        Simulator::with_renderer(scenario, options, Box::new(NullRenderer))
    }

    /// Builds the world described by `scenario`. Entities are announced to `renderer`
    /// as they are created.
    pub fn with_renderer(
        scenario: Scenario,
        options: SimulatorOptions,
        renderer: Box<dyn RenderSink>,
    ) -> Self {
        let mode = scenario.simulation.mode();
        let mut dataset = DatasetLoader::default();
        if let Some(config) = &scenario.simulation.dataset {
            dataset.set_parameters(config.frame_rate, config.pixel_to_meter);
        }

        let mut simulator = Simulator {
            options: options.clone(),
            world: World::default(),
            mode,
            model: model_for(mode, &options),
            playing: false,
            elapsed_time: 0.0,
            step_count: 0,
            dataset,
            orca_overrides: OrcaOverrides {
                time_horizon: scenario.simulation.time_horizon,
                neighbor_distance: scenario.simulation.neighbor_distance,
                max_neighbor_count: scenario.simulation.max_neighbor_count,
            },
            renderer,
            next_handle: 0,
            recorded: BTreeMap::new(),
            recording_start_frame: None,
            scenario,
        };
        simulator.build_world();

        info!("Simulator initialization finished");
        info!(
            "Mode: {}, agents: {}, objects: {}",
            simulator.mode,
            simulator.world.agents.len(),
            simulator.world.objects.len()
        );
        simulator
    }

    fn build_world(&mut self) {
        let agent_configs = self.scenario.agents.clone();
        for (i, config) in agent_configs.iter().enumerate() {
            self.spawn_agent(config, i as u32);
        }

        let walls: Vec<(Vec2, Vec2)> =
            self.scenario.walls.iter().map(|w| (w.start, w.end)).collect();
        for (start, end) in walls {
            self.add_wall(start, end);
        }

        let objects = self.scenario.objects.clone();
        for object in objects {
            match object.object_kind() {
                ObjectKind::Agent => {
                    let config = AgentConfig {
                        position: object.position,
                        ..Default::default()
                    };
                    let fallback_id = self.world.agents.len() as u32;
                    self.spawn_agent(&config, fallback_id);
                }
                ObjectKind::Wall => self.add_wall(object.start, object.end),
                kind => self.world.objects.push(CrowdObject::Marker(Marker {
                    kind,
                    position: object.position,
                    norm: object.norm.normalize_eps(),
                })),
            }
        }
    }

    fn next_handle(&mut self) -> EntityHandle {
        self.next_handle += 1;
        EntityHandle(self.next_handle)
    }

    fn add_wall(&mut self, start: Vec2, end: Vec2) {
        self.world
            .objects
            .extend(Wall::pair(start, end).into_iter().map(CrowdObject::Wall));
        let handle = self.next_handle();
        self.renderer.draw(handle, WALL_STYLE);
    }

    fn spawn_agent(&mut self, config: &AgentConfig, fallback_id: u32) {
        let mut agent = Agent::from_config(config, fallback_id);
        self.orca_overrides.apply(&mut agent);
        let handle = self.next_handle();
        self.renderer.draw(handle, &agent.style);
        self.world.agents.push(agent);
    }

    /// Switches the mode. Time, step count and playback cursor are reset and the
    /// simulator is paused; static objects are kept.
    pub fn set_mode(&mut self, mode: SimulationMode) {
        self.mode = mode;
        self.model = model_for(mode, &self.options);
        self.elapsed_time = 0.0;
        self.step_count = 0;
        self.dataset.reset();
        self.recorded.clear();
        self.playing = false;
        for agent in self.world.agents.iter_mut() {
            agent.reset();
        }

        info!("Simulation mode: {mode}");
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Simulated time since the last mode switch. (seconds)
    pub fn elapsed_time(&self) -> f64 {
        self.elapsed_time
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Recorded frame the next playback tick shows.
    pub fn current_frame(&self) -> Option<u32> {
        self.dataset.current_frame()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.world.agents
    }

    pub fn objects(&self) -> &[CrowdObject] {
        &self.world.objects
    }

    /// Advances the simulation by one tick. Returns `None` when nothing was simulated.
    pub fn step(&mut self, delta_time: f32) -> Option<StepMetrics> {
        if !self.playing {
            return None;
        }

        let mut metrics = StepMetrics::default();
        match self.mode {
            SimulationMode::DatasetPlayback => {
                if !self.advance_playback(&mut metrics) {
                    info!("Dataset playback finished after {} steps", self.step_count);
                    self.pause();
                    return None;
                }
            }
            SimulationMode::SocialForce | SimulationMode::Orca => {
                if self.options.record_trajectories {
                    self.record_start_positions();
                }
                if let Some(model) = &self.model {
                    model.update_states(&mut self.world, delta_time, &mut metrics);
                }
                if self.options.record_trajectories {
                    for agent in &self.world.agents {
                        self.recorded.entry(agent.id).or_default().push(agent.position);
                    }
                }
            }
        }

        self.elapsed_time += delta_time as f64;
        self.step_count += 1;
        metrics.active_agent_count = self.world.agents.len();
        self.renderer.update(delta_time);

        debug!("Step {}: {:?}", self.step_count, metrics);
        Some(metrics)
    }

    fn record_start_positions(&mut self) {
        for agent in &self.world.agents {
            self.recorded
                .entry(agent.id)
                .or_insert_with(|| vec![agent.position]);
        }
    }

    /// Replaces the agents with the next recorded frame. False when the dataset is exhausted.
    fn advance_playback(&mut self, metrics: &mut StepMetrics) -> bool {
        let instant = Instant::now();
        let Some(frame) = self.dataset.next_frame() else {
            return false;
        };

        let configs: Vec<AgentConfig> = self
            .dataset
            .frame_data(frame)
            .iter()
            .map(|p| self.dataset.agent_config_for(p))
            .collect();
        self.world.agents.clear();
        for config in &configs {
            self.spawn_agent(config, 0);
        }

        metrics.time_integration = instant.elapsed().as_secs_f64();
        true
    }

    pub fn dataset(&self) -> &DatasetLoader {
        &self.dataset
    }

    /// Loads a dataset file. `format` is one of `eth`, `ucy`, `trajnet` or `export`.
    pub fn load_dataset(
        &mut self,
        path: impl AsRef<Path>,
        format: &str,
    ) -> Result<(), SimulatorError> {
        let format: DatasetFormat = format.parse()?;
        self.dataset.load_path(path, format)?;
        Ok(())
    }

    pub fn load_dataset_str(&mut self, text: &str, format: &str) -> Result<(), SimulatorError> {
        let format: DatasetFormat = format.parse()?;
        self.dataset.load_str(text, format)?;
        Ok(())
    }

    /// Frame rate and scale used by the next dataset load.
    pub fn set_dataset_parameters(&mut self, frame_rate: f32, pixel_to_meter: f32) {
        self.dataset.set_parameters(frame_rate, pixel_to_meter);
    }

    /// Applies to every current agent and to agents created later.
    pub fn set_orca_parameters(
        &mut self,
        time_horizon: f32,
        neighbor_distance: f32,
        max_neighbor_count: usize,
    ) {
        self.orca_overrides = OrcaOverrides {
            time_horizon: Some(time_horizon),
            neighbor_distance: Some(neighbor_distance),
            max_neighbor_count: Some(max_neighbor_count),
        };
        for agent in self.world.agents.iter_mut() {
            self.orca_overrides.apply(agent);
        }
    }

    /// Replaces the agents with the population of a recorded frame, each heading for the
    /// last point of its trajectory. Returns the number of agents created.
    pub fn populate_from_dataset(&mut self, frame: u32) -> usize {
        let configs: Vec<AgentConfig> = self
            .dataset
            .frame_data(frame)
            .iter()
            .map(|p| {
                let mut config = self.dataset.agent_config_for(p);
                if let Some(last) = self
                    .dataset
                    .trajectory(p.agent_id)
                    .and_then(|t| t.last_point())
                {
                    config.attractor = Some(scenario::AttractorConfig::at(last.position()));
                }
                config
            })
            .collect();

        if configs.is_empty() {
            warn!("No recorded agents in frame {frame}");
        }

        self.world.agents.clear();
        for config in &configs {
            self.spawn_agent(config, 0);
        }
        self.recorded.clear();
        self.recording_start_frame = Some(frame);

        info!("Populated {} agents from frame {frame}", configs.len());
        configs.len()
    }

    /// Positions recorded per agent id, starting with the position before the first tick.
    pub fn recorded_trajectories(&self) -> &BTreeMap<u32, Vec<Vec2>> {
        &self.recorded
    }

    pub fn compare_with_ground_truth(&self, ground_truth: &DatasetLoader) -> EvaluationReport {
        EvaluationReport::compare(&self.recorded, ground_truth, self.recording_start_frame)
    }

    /// Writes the loaded dataset as an export document.
    pub fn export_trajectories(&self, path: impl AsRef<Path>) -> Result<(), SimulatorError> {
        if self.mode != SimulationMode::DatasetPlayback {
            return Err(SimulatorError::NotInDatasetMode);
        }

        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.dataset.export_document())?;
        info!("Exported trajectories: {}", path.as_ref().display());
        Ok(())
    }

    pub fn statistics(&self) -> SimulationStatistics {
        SimulationStatistics {
            mode: self.mode,
            elapsed_time: self.elapsed_time,
            step_count: self.step_count,
            agent_count: self.world.agents.len(),
            object_count: self.world.objects.len(),
            current_frame: self.current_frame(),
            dataset: (!self.dataset.is_empty()).then(|| self.dataset.statistics()),
        }
    }
}

fn model_for(mode: SimulationMode, options: &SimulatorOptions) -> Option<Box<dyn MotionModel>> {
    match mode {
        SimulationMode::SocialForce => Some(Box::new(SocialForceModel)),
        SimulationMode::Orca => Some(Box::new(OrcaModel::new(options.avoidance))),
        SimulationMode::DatasetPlayback => None,
    }
}
