// Desktop entry point. Assets are read from ./assets, the same tree the
// Android build packages into the APK.

use anyhow::Result;
use vkdraw::assets::DirAssets;
use vkdraw::{app, Config};
use winit::event_loop::EventLoop;

fn main() -> Result<()> {
    app::init_logging();

    let assets = DirAssets::new("assets");
    let config = Config::load(&assets);
    app::apply_log_level(&config);
    log::info!("Starting {}", config.app.name);

    let event_loop = EventLoop::new()?;
    app::run(event_loop, config, Box::new(assets))
}
