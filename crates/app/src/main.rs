//! Accele - presentation chain demo.
//!
//! Opens a window, keeps a Vulkan presentation chain in step with it and
//! clears every frame. Resizing, minimising and restoring the window drive
//! the chain through its rebuild path.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use accele_core::{Config, Timer};
use accele_platform::Window;
use accele_renderer::Renderer;

/// How often frame timing is logged.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

struct App {
    config: Config,
    // Dropped before the window it renders to
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: Timer,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            timer: Timer::new(),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        self.timer.tick();
        if let Some(report) = self.timer.report(REPORT_INTERVAL) {
            info!(
                "{:.1} fps ({:.2} ms/frame, chain generation {})",
                report.fps(),
                report.frame_time_ms(),
                renderer.generation().map_or(0, |g| g.get())
            );
        }

        if let Err(e) = renderer.render_frame() {
            if e.is_fatal() {
                error!("Fatal render error, shutting down: {}", e);
                event_loop.exit();
            } else {
                warn!("Render error: {}", e);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(
            event_loop,
            self.config.width,
            self.config.height,
            &self.config.title,
        ) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref()
            && !window.is_minimized()
        {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    let config = Config::from_env()?;
    accele_core::init_logging(config.log_filter.as_deref());
    info!(
        "Starting Accele ({}x{}, validation {})",
        config.width,
        config.height,
        if config.validation { "on" } else { "off" }
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
