pub mod config;
pub mod dashboard;
pub mod executors;
pub mod metrics;
pub mod models;
pub mod queries;
pub mod runner;
