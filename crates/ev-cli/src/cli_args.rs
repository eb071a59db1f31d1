use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ev-cli")]
#[command(about = "Event script checker and agent CLI")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Reports static findings for every event under a directory.
    Check(CheckArgs),
    /// Prints the debug listing of one compiled event.
    Compile(CompileArgs),
    /// Runs an event to its end and prints every command.
    Run(RunArgs),
    Agent(AgentArgs),
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "events-dir")]
    pub(crate) events_dir: String,
    /// Only check this event.
    #[arg(long = "event")]
    pub(crate) event: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct CompileArgs {
    #[arg(long = "events-dir")]
    pub(crate) events_dir: String,
    #[arg(long = "event")]
    pub(crate) event: String,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "events-dir")]
    pub(crate) events_dir: String,
    #[arg(long = "event")]
    pub(crate) event: Option<String>,
    /// JSON object of game state visible to the event.
    #[arg(long = "globals")]
    pub(crate) globals: Option<String>,
    #[arg(long = "set", value_name = "NAME=JSON")]
    pub(crate) sets: Vec<String>,
    #[arg(long = "limit", default_value_t = 10_000)]
    pub(crate) limit: usize,
}

#[derive(Debug, Args)]
pub(crate) struct AgentArgs {
    #[command(subcommand)]
    pub(crate) command: AgentCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum AgentCommand {
    Start(StartArgs),
    Next(NextArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StartArgs {
    #[arg(long = "events-dir")]
    pub(crate) events_dir: String,
    #[arg(long = "event")]
    pub(crate) event: Option<String>,
    #[arg(long = "globals")]
    pub(crate) globals: Option<String>,
    #[arg(long = "set", value_name = "NAME=JSON")]
    pub(crate) sets: Vec<String>,
    #[arg(long = "steps", default_value_t = 1)]
    pub(crate) steps: usize,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}

#[derive(Debug, Args)]
pub(crate) struct NextArgs {
    #[arg(long = "state-in")]
    pub(crate) state_in: String,
    /// Game state changes applied before resuming.
    #[arg(long = "set", value_name = "NAME=JSON")]
    pub(crate) sets: Vec<String>,
    #[arg(long = "steps", default_value_t = 1)]
    pub(crate) steps: usize,
    #[arg(long = "state-out")]
    pub(crate) state_out: String,
}
