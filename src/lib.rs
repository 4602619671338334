pub mod config;
pub mod downloader;
pub mod telemetry;
pub mod web;

pub use config::{Cli, ServerConfig};
pub use web::run_server;
