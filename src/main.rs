use app::App;
use config::ViewerConfig;
use env_logger::Env;
use input::UserEvent;
use log::error;
use winit::event_loop::{self, EventLoop};

mod app;
mod config;
mod input;

fn main() {
    env_logger::Builder::from_env(
        Env::default().filter_or("RUST_LOG", "wgpu_deferred=info,wgpu=warn"),
    )
    .init();
    let config = ViewerConfig::from_env();

    let event_loop = match EventLoop::<UserEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            error!("Cannot create event loop: {}", err);
            return;
        }
    };
    event_loop.set_control_flow(event_loop::ControlFlow::Poll);

    let mut app = App::new(event_loop.create_proxy(), config);
    if let Err(err) = event_loop.run_app(&mut app) {
        error!("Event loop error: {}", err);
    }
}
