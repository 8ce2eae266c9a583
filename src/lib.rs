pub mod chart;
pub mod cli;
pub mod config;
pub mod metrics;
pub mod net;
pub mod poll;
pub mod sampler;
pub mod series;
pub mod state;
pub mod ui;
