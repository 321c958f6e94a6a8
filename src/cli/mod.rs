mod args;
pub mod config;
pub mod meetings;

pub use args::{Cli, CliCommand, MeetingsCliArgs};
pub use config::handle_config_command;
pub use meetings::handle_meetings_command;
