use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Start, stop and inspect robot skill containers from declarative profiles",
    propagate_version = true
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Project root (defaults to the nearest ancestor with docker-compose.yml or infrastructure/)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start every service of a profile in dependency order
    Up(ProfileTargetArgs),
    /// Stop a profile, or every project container when no profile is given
    Down(DownArgs),
    /// Show the state of project and skill containers
    Status,
    /// List profiles or show one
    Profiles(ProfilesArgs),
    /// Print a fully resolved profile
    Show(ShowArgs),
    /// Show container logs of a skill or service
    Logs(LogsArgs),
    /// Run a command inside a skill's running container
    Exec(ExecArgs),
    /// Inspect user settings
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ProfileTargetArgs {
    pub profile: String,
}

#[derive(Debug, Args)]
pub struct DownArgs {
    pub profile: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProfilesArgs {
    #[command(subcommand)]
    pub command: Option<ProfileCommand>,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    List,
    Show {
        profile: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub profile: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Args)]
pub struct LogsArgs {
    pub service: String,
    #[arg(short, long)]
    pub follow: bool,
    #[arg(short = 'n', long, default_value_t = 100)]
    pub tail: u32,
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    pub skill: String,
    /// Command to run; an interactive shell when omitted
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Paths,
}
