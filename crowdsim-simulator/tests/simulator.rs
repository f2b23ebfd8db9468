use std::sync::{Arc, Mutex};

use assert_float_eq::*;
use crowdsim_simulator::{
    dataset::{DatasetFormat, DatasetLoader},
    models::{AvoidanceStrategy, SimulationMode},
    render::{EntityHandle, RenderSink},
    object::{CrowdObject, ObjectKind, SpatialEntity},
    scenario::Scenario,
    Simulator, SimulatorError, SimulatorOptions, WALL_STYLE,
};
use glam::vec2;

const CORRIDOR: &str = r#"{
    "steps": 100,
    "timeslice": 0.1,
    "agents": [
        {"pos": [0, 0], "maxVel": 1.0, "accel": 1.0,
         "attractor": {"type": "attractor", "pos": [10, 0], "norm": [0, 0]}}
    ],
    "walls": [
        {"start": [-5, 2], "end": [15, 2]},
        {"start": [-5, -2], "end": [15, -2]}
    ],
    "objects": [
        {"type": "obstacle", "pos": [5, 1.5]},
        {"type": "attractor", "pos": [10, 0]}
    ]
}"#;

const TWO_FRAMES: &str = "0 1 0 0\n1 1 1 0\n";

fn single_agent() -> Simulator {
    let scenario = Scenario::from_json_str(
        r#"{"agents": [{"pos": [0, 0], "maxVel": 1.0, "accel": 1.0,
                        "attractor": {"pos": [10, 0]}}]}"#,
    )
    .unwrap();
    Simulator::from_scenario(scenario, SimulatorOptions::default())
}

fn dataset_simulator(text: &str) -> Simulator {
    let mut simulator = Simulator::from_scenario(Scenario::default(), SimulatorOptions::default());
    simulator.set_dataset_parameters(1.0, 1.0);
    simulator.load_dataset_str(text, "eth").unwrap();
    simulator.set_mode(SimulationMode::DatasetPlayback);
    simulator
}

#[derive(Clone, Default)]
struct RecordingRenderer {
    drawn: Arc<Mutex<Vec<(EntityHandle, String)>>>,
    updates: Arc<Mutex<usize>>,
}

impl RenderSink for RecordingRenderer {
    fn draw(&mut self, handle: EntityHandle, style: &str) {
        self.drawn.lock().unwrap().push((handle, style.to_string()));
    }

    fn update(&mut self, _delta_time: f32) {
        *self.updates.lock().unwrap() += 1;
    }
}

#[test]
fn test_paused_simulator_does_nothing() {
    let mut simulator = single_agent();
    assert!(!simulator.is_playing());
    assert!(simulator.step(1.0).is_none());
    assert_eq!(simulator.agents()[0].position, vec2(0.0, 0.0));
    assert_float_absolute_eq!(simulator.elapsed_time(), 0.0);
}

#[test]
fn test_social_force_single_tick() {
    let mut simulator = single_agent();
    simulator.play();

    let metrics = simulator.step(1.0).unwrap();
    assert_eq!(metrics.active_agent_count, 1);

    let agent = &simulator.agents()[0];
    assert!(agent.position.x > 0.0);
    assert!(agent.position.distance(vec2(10.0, 0.0)) < 10.0);
    assert_float_absolute_eq!(agent.position.y, 0.0);
    assert!(agent.velocity.length() <= 1.0 + 1e-6);
    assert_float_absolute_eq!(simulator.elapsed_time(), 1.0);
    assert_eq!(simulator.step_count(), 1);
}

#[test]
fn test_world_construction() {
    let scenario = Scenario::from_json_str(CORRIDOR).unwrap();
    let simulator = Simulator::from_scenario(scenario, SimulatorOptions::default());

    assert_eq!(simulator.agents().len(), 1);
    // two half-walls per configured wall plus two markers
    assert_eq!(simulator.objects().len(), 6);
    assert_eq!(simulator.mode(), SimulationMode::SocialForce);
}

#[test]
fn test_generic_objects_expand_by_type() {
    let scenario = Scenario::from_json_str(
        r#"{"objects": [
            {"type": "wall", "start": [0, 0], "end": [4, 0]},
            {"type": "agent", "pos": [1, 2]},
            {"type": "fallen agent", "pos": [3, 1]}
        ]}"#,
    )
    .unwrap();
    let simulator = Simulator::from_scenario(scenario, SimulatorOptions::default());

    assert_eq!(simulator.agents().len(), 1);
    assert_float_absolute_eq!(simulator.agents()[0].position.x, 1.0);
    assert_float_absolute_eq!(simulator.agents()[0].position.y, 2.0);

    let kinds: Vec<ObjectKind> = simulator.objects().iter().map(|o| o.kind()).collect();
    assert_eq!(kinds, vec![ObjectKind::Wall, ObjectKind::Wall, ObjectKind::FallenAgent]);

    let (CrowdObject::Wall(front), CrowdObject::Wall(back)) =
        (&simulator.objects()[0], &simulator.objects()[1])
    else {
        panic!("walls are expanded into two half-walls");
    };
    assert_float_absolute_eq!((front.norm() + back.norm()).length(), 0.0);
    assert_float_absolute_eq!(front.norm().length(), 1.0, 1e-5);
    assert_eq!((front.start, front.end), (back.end, back.start));
    assert_eq!(simulator.objects()[2].position(), vec2(3.0, 1.0));
}

#[test]
fn test_corridor_agent_stays_between_walls() {
    let scenario = Scenario::from_json_str(CORRIDOR).unwrap();
    for mode in [SimulationMode::SocialForce, SimulationMode::Orca] {
        let mut simulator = Simulator::from_scenario(scenario.clone(), SimulatorOptions::default());
        simulator.set_mode(mode);
        simulator.play();

        for _ in 0..200 {
            simulator.step(0.1);
            let agent = &simulator.agents()[0];
            assert!(agent.position.is_finite());
            assert!(agent.position.y.abs() < 2.0);
            assert!(agent.velocity.length() <= agent.max_velocity + 1e-5);
        }
        assert!(simulator.agents()[0].position.x > 5.0, "{mode}");
    }
}

#[test]
fn test_mode_switch_keeps_objects() {
    let scenario = Scenario::from_json_str(CORRIDOR).unwrap();
    let mut simulator = Simulator::from_scenario(scenario, SimulatorOptions::default());
    simulator.load_dataset_str(TWO_FRAMES, "eth").unwrap();
    simulator.play();
    for _ in 0..5 {
        simulator.step(0.1);
    }

    let objects = simulator.objects().len();
    simulator.set_mode(SimulationMode::Orca);

    assert_eq!(simulator.objects().len(), objects);
    assert_float_absolute_eq!(simulator.elapsed_time(), 0.0);
    assert_eq!(simulator.step_count(), 0);
    assert_eq!(simulator.current_frame(), Some(0));
    assert!(!simulator.is_playing());
}

#[test]
fn test_orca_crossing_respects_speed_limit() {
    let scenario = Scenario::random(30, 12.0, 7);
    for avoidance in [AvoidanceStrategy::LinearProgram, AvoidanceStrategy::Repulsion] {
        let options = SimulatorOptions {
            avoidance,
            ..Default::default()
        };
        let mut simulator = Simulator::from_scenario(scenario.clone(), options);
        simulator.set_mode(SimulationMode::Orca);
        simulator.play();

        for _ in 0..50 {
            simulator.step(0.1);
            for agent in simulator.agents() {
                assert!(agent.position.is_finite());
                assert!(agent.velocity.length() <= agent.max_velocity + 1e-5);
            }
        }
    }
}

#[test]
fn test_two_frame_dataset() {
    let mut simulator = dataset_simulator(TWO_FRAMES);

    let loader = simulator.dataset();
    let first = loader.agent_point(1, 0).unwrap();
    assert_float_absolute_eq!(first.vx, 1.0);
    assert_float_absolute_eq!(first.vy, 0.0);

    let path = std::env::temp_dir().join(format!("crowdsim_export_{}.json", std::process::id()));
    simulator.export_trajectories(&path).unwrap();
    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(document["steps"], 2);
    assert_eq!(document["trajectories"][0]["agentId"], 1);
    assert_eq!(document["trajectories"][0]["startTime"], 0.0);
    assert_eq!(document["trajectories"][0]["endTime"], 1.0);

    simulator.set_mode(SimulationMode::Orca);
    assert!(matches!(
        simulator.export_trajectories(&path),
        Err(SimulatorError::NotInDatasetMode)
    ));
}

#[test]
fn test_dataset_playback() {
    let mut simulator = dataset_simulator("0 1 0 0\n0 2 5 5\n1 1 1 0\n");
    simulator.play();

    simulator.step(0.4).unwrap();
    assert_eq!(simulator.agents().len(), 2);
    let agent = simulator.agents().iter().find(|a| a.id == 1).unwrap();
    assert_eq!(agent.position, vec2(0.0, 0.0));
    assert_eq!(agent.goal, Some(vec2(1.0, 0.0)));
    assert_eq!(simulator.current_frame(), Some(1));

    simulator.step(0.4).unwrap();
    assert_eq!(simulator.agents().len(), 1);
    assert_eq!(simulator.agents()[0].position, vec2(1.0, 0.0));

    // out of frames: pause without counting time
    assert!(simulator.step(0.4).is_none());
    assert!(!simulator.is_playing());
    assert_float_absolute_eq!(simulator.elapsed_time(), 0.8, 1e-6);
    assert_eq!(simulator.step_count(), 2);
}

#[test]
fn test_unknown_dataset_format() {
    let mut simulator = single_agent();
    assert!(simulator.load_dataset_str(TWO_FRAMES, "csv").is_err());
    assert!(simulator.load_dataset("/nonexistent/crowdsim.txt", "eth").is_err());
}

#[test]
fn test_ground_truth_comparison() {
    let text = "0 1 0 0\n1 1 1 0\n2 1 2 0\n3 1 3 0\n";
    let mut ground_truth = DatasetLoader::new(1.0, 1.0);
    ground_truth.load_str(text, DatasetFormat::Eth).unwrap();

    let options = SimulatorOptions {
        record_trajectories: true,
        ..Default::default()
    };
    let mut simulator = Simulator::from_scenario(Scenario::default(), options);
    simulator.set_dataset_parameters(1.0, 1.0);
    simulator.load_dataset_str(text, "eth").unwrap();
    assert_eq!(simulator.populate_from_dataset(0), 1);
    assert_eq!(simulator.agents()[0].goal, Some(vec2(3.0, 0.0)));

    simulator.play();
    for _ in 0..3 {
        simulator.step(1.0);
    }

    assert_eq!(simulator.recorded_trajectories()[&1].len(), 4);
    let report = simulator.compare_with_ground_truth(&ground_truth);
    assert_eq!(report.agents.len(), 1);
    assert_eq!(report.agents[0].compared_points, 4);
    assert!(report.mean_ade.is_finite());
    assert!(report.mean_fde.is_finite());
}

#[test]
fn test_orca_parameters_apply_to_new_agents() {
    let mut simulator = dataset_simulator(TWO_FRAMES);
    simulator.set_orca_parameters(5.0, 3.0, 4);
    simulator.play();
    simulator.step(0.1);

    let orca = simulator.agents()[0].orca;
    assert_float_absolute_eq!(orca.time_horizon, 5.0);
    assert_float_absolute_eq!(orca.neighbor_distance, 3.0);
    assert_eq!(orca.max_neighbor_count, 4);
}

#[test]
fn test_renderer_receives_entities() {
    let renderer = RecordingRenderer::default();
    let scenario = Scenario::from_json_str(CORRIDOR).unwrap();
    let mut simulator = Simulator::with_renderer(
        scenario,
        SimulatorOptions::default(),
        Box::new(renderer.clone()),
    );
    simulator.play();
    simulator.step(0.1);
    simulator.step(0.1);

    let drawn = renderer.drawn.lock().unwrap();
    let walls = drawn.iter().filter(|(_, style)| style == WALL_STYLE).count();
    assert_eq!(walls, 2);
    assert!(drawn.iter().any(|(_, style)| style == "blue.mesh"));
    assert_eq!(*renderer.updates.lock().unwrap(), 2);
}

#[test]
fn test_statistics() {
    let mut simulator = dataset_simulator(TWO_FRAMES);
    simulator.play();
    simulator.step(1.0);

    let stats = simulator.statistics();
    assert_eq!(stats.mode, SimulationMode::DatasetPlayback);
    assert_eq!(stats.step_count, 1);
    assert_eq!(stats.agent_count, 1);
    assert_eq!(stats.current_frame, Some(1));
    assert_eq!(stats.dataset.unwrap().frame_count, 2);
}
