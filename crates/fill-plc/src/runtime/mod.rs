mod app;
mod config;
mod logging;
mod shutdown;
mod telemetry;

pub use app::run_from_args;
