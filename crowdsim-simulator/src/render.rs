use std::fmt;

/// Identifier handed to the renderer for each drawable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(pub u64);

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Display collaborator of the simulator.
pub trait RenderSink: Send {
    /// Called once for every newly created entity.
    fn draw(&mut self, handle: EntityHandle, style: &str);

    /// Called once per simulated tick.
    fn update(&mut self, delta_time: f32);
}

/// Renderer that discards everything. Used for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl RenderSink for NullRenderer {
    fn draw(&mut self, _handle: EntityHandle, _style: &str) {}

    fn update(&mut self, _delta_time: f32) {}
}
