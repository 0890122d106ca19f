// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

pub mod frame;
pub mod viewport;

pub use frame::{
    Acquire, FrameBackend, FrameCounter, FrameOutcome, FrameSynchronizer, ImageGuards,
    PresentStatus, Rebuild,
};
pub use viewport::SquareViewport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Parameters of the single prerecorded draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawParams {
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl Default for DrawParams {
    fn default() -> Self {
        // vertices come from the vertex shader itself
        DrawParams {
            vertex_count: 3,
            instance_count: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub app_name: String,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub validation: bool,
    /// `None` resolves to `<executable-dir>/assets/shaders`.
    pub shader_dir: Option<PathBuf>,
    pub draw: DrawParams,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            app_name: "rook".to_string(),
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            shader_dir: None,
            draw: DrawParams::default(),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Resize notification: records the new framebuffer size and schedules a rebuild.
    fn resize(&mut self, size: RenderSize);
    fn render(&mut self) -> Result<FrameOutcome>;
    fn wait_idle(&mut self) -> Result<()>;
}
