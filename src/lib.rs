pub mod adapters;
pub mod configuration;
pub mod models;
pub mod registry;
pub mod startup;
pub mod storage;
pub mod telemetry;
