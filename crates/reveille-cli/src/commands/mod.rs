pub mod alarm;
pub mod config;
pub mod engine;
pub mod instance;
