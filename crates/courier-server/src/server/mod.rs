pub mod config;
pub mod handler;
pub mod source;
pub mod telemetry;
