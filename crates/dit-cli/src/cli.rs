use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dit",
    about = "Deploy a project directory by uploading only what changed",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sync the project and upload the delta
    Deploy(DeployArgs),
    /// Show what the next deploy would upload or delete
    Status(StatusArgs),
    /// Forget the manifest so the next deploy uploads everything
    Reset(ResetArgs),
    /// Start the deploy receiver
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct DeployArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,
    /// Deploy service base URL
    #[arg(long, env = "DIT_HOST")]
    pub host: Option<String>,
    /// Version tag sent with the upload [default: latest]
    #[arg(long, env = "DIT_TAG")]
    pub tag: Option<String>,
    /// Bearer token for the deploy service
    #[arg(long, env = "DIT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Detect changes by hashing file contents instead of metadata
    #[arg(long)]
    pub content_hash: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,
    #[arg(long)]
    pub content_hash: bool,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Directory applications are deployed into
    #[arg(long)]
    pub apps_root: Option<PathBuf>,
    /// Require this bearer token on deploys
    #[arg(long, env = "DIT_SERVER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}
