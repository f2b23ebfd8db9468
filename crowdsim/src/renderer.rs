use crowdsim_simulator::render::{EntityHandle, RenderSink};
use log::trace;

/// Headless renderer that traces what a display would receive.
#[derive(Debug, Default)]
pub struct LogRenderer {
    entities: usize,
    frames: usize,
}

impl RenderSink for LogRenderer {
    fn draw(&mut self, handle: EntityHandle, style: &str) {
        self.entities += 1;
        trace!("Draw {handle} as {style} ({} entities)", self.entities);
    }

    fn update(&mut self, delta_time: f32) {
        self.frames += 1;
        trace!("Frame {}: {delta_time} s", self.frames);
    }
}
