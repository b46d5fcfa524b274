// =============================================================================
// APPLICATION - platform event loop driving the renderer
// =============================================================================
//
// LIFECYCLE:
//   resumed      -> create window (once) + renderer, record commands
//   redraw       -> draw one frame (skipped frames are retried next tick)
//   suspended    -> tear the renderer down (Android destroys the native window)
//   close / drop -> tear down and exit
//
// =============================================================================

use anyhow::Result;
use ash::vk;
use log::LevelFilter;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

use crate::assets::AssetSource;
use crate::backend::{DeviceContext, DeviceOps};
use crate::config::Config;
use crate::renderer::Renderer;

/// Install the logger before the configuration is read, at info level.
/// `apply_log_level` narrows or widens it once the configuration is known.
pub fn init_logging() {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Trace);
    builder.parse_default_env();
    // A re-entered android_main finds the logger already installed
    if builder.try_init().is_ok() && std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_none() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Switch to the configured level. RUST_LOG, when set, wins.
pub fn apply_log_level(config: &Config) {
    let rust_log = std::env::var_os(env_logger::DEFAULT_FILTER_ENV);
    if let Some(level) = configured_level(config, rust_log.as_deref()) {
        log::set_max_level(level);
    }
}

fn configured_level(config: &Config, rust_log: Option<&OsStr>) -> Option<LevelFilter> {
    match rust_log {
        Some(_) => None,
        None => Some(config.log_level()),
    }
}

/// Run the event loop until the window closes
pub fn run(event_loop: EventLoop<()>, config: Config, assets: Box<dyn AssetSource>) -> Result<()> {
    let mut app: App = App::new(config, assets);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Once-a-second frame statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub skipped: u32,
}

#[derive(Debug)]
pub struct FrameCounter {
    drawn: u32,
    skipped: u32,
    window_start: Instant,
}

impl FrameCounter {
    const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(now: Instant) -> Self {
        Self {
            drawn: 0,
            skipped: 0,
            window_start: now,
        }
    }

    /// Count one tick; returns stats when a report interval has elapsed
    pub fn record(&mut self, drew: bool, now: Instant) -> Option<FrameStats> {
        if drew {
            self.drawn += 1;
        } else {
            self.skipped += 1;
        }

        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < Self::REPORT_INTERVAL {
            return None;
        }

        let stats = FrameStats {
            fps: self.drawn as f32 / elapsed.as_secs_f32(),
            skipped: self.skipped,
        };
        *self = Self::new(now);
        Some(stats)
    }
}

/// Application state.
///
/// IMPORTANT: the renderer is declared before the window so it is dropped
/// first; the surface must not outlive the native window.
pub struct App<D: DeviceOps = DeviceContext> {
    renderer: Option<Renderer<D>>,
    window: Option<Arc<Window>>,
    needs_rebuild: bool,
    config: Config,
    assets: Box<dyn AssetSource>,
    frames: FrameCounter,
}

impl<D: DeviceOps> App<D> {
    pub fn new(config: Config, assets: Box<dyn AssetSource>) -> Self {
        Self {
            renderer: None,
            window: None,
            needs_rebuild: false,
            config,
            assets,
            frames: FrameCounter::new(Instant::now()),
        }
    }

    /// Release every Vulkan object. Safe to call any number of times.
    pub fn teardown(&mut self) -> bool {
        match self.renderer.take() {
            Some(renderer) => {
                log::info!("Tearing down renderer");
                drop(renderer);
                true
            }
            None => false,
        }
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }
}

impl App {

    fn start_renderer(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        let extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        let mut renderer = Renderer::new(&self.config, window, extent, self.assets.as_ref())?;
        renderer.init()?;

        if self.config.debug.print_device_info {
            match renderer.report() {
                Ok(report) => log::info!("\n{}", report),
                Err(e) => log::warn!("Device report unavailable: {:#}", e),
            }
        }

        self.renderer = Some(renderer);
        self.needs_rebuild = false;
        self.frames = FrameCounter::new(Instant::now());
        log::info!("Renderer ready");
        Ok(())
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        if self.needs_rebuild {
            self.teardown();
            if let Some(window) = self.window.clone() {
                if let Err(e) = self.start_renderer(&window) {
                    log::error!("Failed to rebuild renderer: {:?}", e);
                    event_loop.exit();
                    return;
                }
            }
        }

        let Some(renderer) = self.renderer.as_ref() else {
            return;
        };

        let drew = renderer.draw_frame();
        if let Some(stats) = self.frames.record(drew, Instant::now()) {
            if self.config.debug.show_fps {
                log::info!("{:.0} FPS, {} skipped frames", stats.fps, stats.skipped);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        let window = match self.window.clone() {
            Some(window) => window,
            None => {
                let attributes = WindowAttributes::default().with_title(&self.config.app.name);
                match event_loop.create_window(attributes) {
                    Ok(window) => Arc::new(window),
                    Err(e) => {
                        log::error!("Failed to create window: {:?}", e);
                        event_loop.exit();
                        return;
                    }
                }
            }
        };

        if let Err(e) = self.start_renderer(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        // The native window is about to go away; the surface must go first
        self.teardown();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.teardown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = &self.renderer {
                    let extent = renderer.extent();
                    if size.width != 0
                        && size.height != 0
                        && (size.width != extent.width || size.height != extent.height)
                    {
                        self.needs_rebuild = true;
                    }
                }
            }

            WindowEvent::RedrawRequested => self.draw(event_loop),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

impl<D: DeviceOps> Drop for App<D> {
    fn drop(&mut self) {
        self.teardown();
        log::info!("Cleanup complete");
    }
}
