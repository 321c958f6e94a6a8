pub mod admission;
pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod global;
pub mod lifecycle;
pub mod registry;
pub mod worker;
