pub mod config;
pub mod sources;
