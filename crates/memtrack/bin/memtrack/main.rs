mod cmd;

use clap::{Parser, Subcommand};
use cmd::descs::DescsArgs;
use cmd::replay::ReplayArgs;
use eyre::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Subcommand, Debug)]
pub enum MTSubcommand {
    #[command(about = "Replay a JSON-lines allocation trace and print the memory reports")]
    Replay(ReplayArgs),
    #[command(about = "List the built-in allocation categories")]
    Descs(DescsArgs),
}

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "memtrack CLI: replay allocation traces through the memory tracker

Diagnostics are written to stderr; set RUST_LOG=debug to see ledger resizes."
)]
pub struct MTArgs {
    #[command(subcommand)]
    pub cmd: MTSubcommand,
}

fn main() -> Result<()> {
    init_logging();
    let root_args = MTArgs::parse();

    match root_args.cmd {
        MTSubcommand::Replay(args) => {
            args.run()?;
        }
        MTSubcommand::Descs(args) => {
            args.run()?;
        }
    }

    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}
