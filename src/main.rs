use std::process::ExitCode;

use clap::Parser;

use cdcflow::cli::{Cli, Command};
use cdcflow::{commands, logging};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("cdcflow {}", commands::version());
        return ExitCode::SUCCESS;
    }

    let config = match cdcflow_providers::Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config '{}': {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    logging::init(config.debug);
    let _sentry_guard = config.sentry.as_ref().map(logging::init_sentry);

    let result = match cli.command {
        Command::Start => commands::start(config).await,
        Command::Refresh { table, size, keep_index } => commands::refresh(config, table, size, keep_index).await,
        Command::Check { table } => commands::check(config, table).await,
        Command::Version => unreachable!("handled above"),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "fatal error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
