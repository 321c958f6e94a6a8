use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "meetbot")]
#[command(about = "Sends recording bots into scheduled meetings", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the orchestrator (default)
    Run,
    /// Fetch the meeting directory once and show what would be admitted
    Meetings(MeetingsCliArgs),
    /// Print the effective configuration
    Config,
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug)]
pub struct MeetingsCliArgs {
    /// Also list older meetings that are superseded by a newer one
    #[arg(short, long)]
    pub all: bool,
}
