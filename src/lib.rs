pub mod config;
pub mod console_display;
pub mod coordinator;
pub mod data_logger;
pub mod dsp;
pub mod error;
pub mod filters;
pub mod generator;
pub mod noise;
pub mod script;
pub mod simulator;
pub mod types;
pub mod ws_server;
