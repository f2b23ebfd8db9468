use std::fmt::Debug;

use serde::Serialize;

use crate::models::SimulationMode;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DiagnosticLog {
    pub mode: SimulationMode,
    pub scenario: String,
    pub total_steps: usize,
    pub step_metrics: StepMetricsCollection,
}

impl DiagnosticLog {
    pub fn new(mode: SimulationMode, scenario: impl Into<String>) -> Self {
        DiagnosticLog {
            mode,
            scenario: scenario.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, step_metrics: StepMetrics) {
        self.step_metrics.push(step_metrics);
        self.total_steps += 1;
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct StepMetricsCollection {
    pub active_agent_count: Vec<usize>,
    pub time_perception: Vec<f64>,
    pub time_decision: Vec<f64>,
    pub time_integration: Vec<f64>,
}

impl StepMetricsCollection {
    pub fn push(&mut self, metrics: StepMetrics) {
        self.active_agent_count.push(metrics.active_agent_count);
        self.time_perception.push(metrics.time_perception);
        self.time_decision.push(metrics.time_decision);
        self.time_integration.push(metrics.time_integration);
    }

    pub fn len(&self) -> usize {
        self.active_agent_count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_agent_count.is_empty()
    }
}

/// Timings of one tick, in seconds.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StepMetrics {
    pub active_agent_count: usize,
    pub time_perception: f64,
    pub time_decision: f64,
    pub time_integration: f64,
}
