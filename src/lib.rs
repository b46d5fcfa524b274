// =============================================================================
// VKDRAW - one orange triangle through the whole Vulkan presentation path
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, Android lifecycle)                      │
// │    └── Renderer                                                 │
// │          └── DeviceContext (instance, surface, device, queue)   │
// │                ├── Swapchain + RenderTargets                    │
// │                ├── RenderPass + Pipeline                        │
// │                ├── VertexBuffer                                 │
// │                └── FrameDriver (commands, semaphore, fence)     │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Acquire swapchain image
// 2. Submit the pre-recorded command buffer for that image
// 3. Wait on the frame fence
// 4. Present
//
// =============================================================================

pub mod app;
pub mod assets;
pub mod backend;
pub mod config;
pub mod renderer;

pub use app::App;
pub use config::Config;
pub use renderer::Renderer;

/// NativeActivity entry point
#[cfg(target_os = "android")]
#[no_mangle]
fn android_main(android_app: winit::platform::android::activity::AndroidApp) {
    use winit::event_loop::EventLoop;
    use winit::platform::android::EventLoopBuilderExtAndroid;

    app::init_logging();

    let assets = assets::AndroidAssets::new(android_app.clone());
    let config = Config::load(&assets);
    app::apply_log_level(&config);
    log::info!("Starting {}", config.app.name);

    let event_loop = match EventLoop::builder().with_android_app(android_app).build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {:?}", e);
            return;
        }
    };

    if let Err(e) = app::run(event_loop, config, Box::new(assets)) {
        log::error!("Event loop error: {:?}", e);
    }
}
