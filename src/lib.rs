pub mod constants;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod storage;

pub mod config;
pub mod observability;

// Layered boundaries: ports the pipeline depends on and their adapters
pub mod app;
pub mod infra;
