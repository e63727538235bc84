mod cli;
mod command;
mod config;
mod error;
mod synthetic;

use error::WrapErr;

use clap::CommandFactory;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> error::Result<()> {
    color_eyre::install()?;
    let command_line = cli::Cli::parse();
    init_tracing(command_line.verbose);

    let cfg = config::Config::load().context("Load configuration error")?;

    if let Some(command) = command_line.command {
        let cmd: Box<dyn command::Command> = match command {
            cli::Commands::Simulate {
                from,
                to,
                delay_ms,
                page_size,
                sync,
                no_cache,
            } => Box::new(command::SimulateCommand::new(
                cfg, from, to, delay_ms, page_size, sync, no_cache,
            )),
            cli::Commands::Inspect { uuid, limit } => {
                Box::new(command::InspectCommand::new(cfg, uuid, limit))
            }
            cli::Commands::Fetch { uuid, start, end } => {
                Box::new(command::FetchCommand::new(cfg, uuid, start, end))
            }
            cli::Commands::ClearCache => Box::new(command::ClearCacheCommand::new(cfg)),
        };
        cmd.execute().await?;
    } else {
        cli::Cli::command().print_help()?;
    }

    Ok(())
}
