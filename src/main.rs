use billing_ingest::cli::Cli;
use billing_ingest::commands::{self, AppState};
use billing_ingest::config::{self, Settings};
use billing_ingest::logging;
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env may carry BILLING_LOG, so load it before the subscriber.
    config::load_env();
    logging::init_logger(cli.verbose);

    let state = match Settings::load().and_then(|settings| AppState::new(settings, cli.json)) {
        Ok(state) => state,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    debug!(api_url = %state.settings.api_url, auth = state.settings.auth_status(), "starting");

    match commands::run(&state, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
