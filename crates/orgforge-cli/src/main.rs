mod cmd_config;
mod cmd_generate;
mod cmd_plan;
mod cmd_validate;
mod sink;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "orgforge",
    version,
    about = "Generate a consistent synthetic company: org chart, tickets, emails, and meetings"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the graph, generate every artifact, and write the dataset
    Generate {
        #[command(flatten)]
        config: cmd_config::ConfigArgs,
        /// Output directory
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
        /// Text generation provider
        #[arg(long, value_enum, default_value = "anthropic", env = "ORGFORGE_PROVIDER")]
        provider: cmd_generate::ProviderKind,
        /// Model override for the provider
        #[arg(long, env = "ORGFORGE_MODEL")]
        model: Option<String>,
        /// Replace a dataset already in the output directory
        #[arg(long)]
        force: bool,
    },
    /// Build the graph and plan scenarios without generating any text
    Plan {
        #[command(flatten)]
        config: cmd_config::ConfigArgs,
        /// Print the planned events as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-validate every artifact of a written dataset
    Validate {
        /// Dataset directory
        #[arg(default_value = "out")]
        dir: PathBuf,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orgforge=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Generate {
            config,
            out,
            provider,
            model,
            force,
        } => cmd_generate::execute(&cmd_generate::GenerateParams {
            config: &config,
            out: &out,
            provider,
            model: model.as_deref(),
            force,
        }),
        Command::Plan { config, json } => cmd_plan::execute(&config, json),
        Command::Validate { dir } => cmd_validate::execute(&dir),
        Command::Config { cmd } => cmd_config::run(cmd),
    }
}
