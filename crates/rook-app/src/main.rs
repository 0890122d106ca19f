// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use rook_core::init_tracing;
use rook_platform::{framebuffer_size, WindowSpec};
use rook_render::{RenderSettings, RenderSize, Renderer};
use rook_render_vk::VkRenderer;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

use rook_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; without it ./rook.toml is used when present
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frames in flight, overrides the config file
    #[arg(long)]
    frames_in_flight: Option<usize>,
    /// Skip the Vulkan validation layer in debug builds
    #[arg(long)]
    no_validation: bool,
}

struct App {
    window_spec: WindowSpec,
    settings: RenderSettings,

    // dropped before the window it renders into
    renderer: Option<VkRenderer>,
    window: Option<Window>,

    exiting: bool,
    fatal: Option<anyhow::Error>,

    last_report: Instant,
    last_frames: u64,
}

impl App {
    fn new(window_spec: WindowSpec, settings: RenderSettings) -> Self {
        App {
            window_spec,
            settings,
            renderer: None,
            window: None,
            exiting: false,
            fatal: None,
            last_report: Instant::now(),
            last_frames: 0,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(self.window_spec.attributes())
            .context("create_window")?;
        let (width, height) = framebuffer_size(&window);
        let renderer = VkRenderer::new(&window, &window, RenderSize { width, height }, &self.settings)
            .context("vulkan init")?;
        info!("renderer ready on {} ({}x{})", renderer.device_name(), width, height);

        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Stops the loop; `main` hands the error back to the shell.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("fatal: {err:#}");
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        self.fatal = Some(err);
        event_loop.exit();
    }

    fn report_fps(&mut self) {
        let Some(r) = &self.renderer else { return };
        let now = Instant::now();
        if now.duration_since(self.last_report).as_secs_f32() >= 1.0 {
            let frames = r.frame_counter().frames();
            info!("fps ~ {}", frames - self.last_frames);
            self.last_frames = frames;
            self.last_report = now;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.exiting = true;
                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.wait_idle() {
                        error!("wait_idle on close: {e:#}");
                    }
                }
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                let size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                info!("Resized -> {}x{}", size.width, size.height);
                if let Some(r) = &mut self.renderer {
                    r.resize(size);
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(r) = &mut self.renderer else { return };
                if let Err(e) = r.render() {
                    self.fail(event_loop, e.context("render"));
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }
        self.report_fps();
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let cfg = config::load_cfg(args.config.as_deref())?;
    let settings = cfg.render_settings(args.frames_in_flight, args.no_validation);

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App::new(cfg.window_spec(), settings);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => {
            info!("clean exit");
            Ok(())
        }
    }
}
