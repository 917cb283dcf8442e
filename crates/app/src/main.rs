//! Spinning textured quad - Main Entry Point
//!
//! Usage: `texquad [config.toml]`. Without an argument `texquad.toml` in the
//! working directory is used if present, otherwise built-in defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use texquad_core::{FpsCounter, RendererConfig};
use texquad_platform::Window;
use texquad_renderer::{CancellationToken, Renderer};

struct App {
    config: RendererConfig,
    cancel: CancellationToken,
    fps: FpsCounter,
    // Dropped before the window it renders to
    renderer: Option<Renderer>,
    window: Option<Window>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            fps: FpsCounter::new(),
            renderer: None,
            window: None,
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.cancel.cancel();
        self.renderer = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, &self.config, self.cancel.clone()) {
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
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                // Non-resizable window; the swapchain is kept as created.
                warn!(
                    "Ignoring resize to {}x{}, swapchain recreation is not supported",
                    size.width, size.height
                );
            }
            WindowEvent::RedrawRequested => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };

                if let Err(e) = renderer.render_frame() {
                    error!("Render error: {}", e);
                    self.shutdown(event_loop);
                    return;
                }

                if let Some(fps) = self.fps.record_frame() {
                    info!("FPS: {:.1}", fps);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    texquad_core::init_logging();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = RendererConfig::load_or_default(config_path.as_deref())
        .context("failed to load configuration")?;
    info!("Starting {}", config.window.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
