pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod model;
pub mod progress;
pub mod providers;
pub mod report;
pub mod storage;
