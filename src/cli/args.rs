use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "voxrelay", about = "RTC channel coordination and recording orchestration")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the orchestration service (default when no command is given)
    Serve,
    /// Print the version
    Version,
}
