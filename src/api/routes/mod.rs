//! API route modules.

pub mod bots;
pub mod status;
