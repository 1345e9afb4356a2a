use trackfetch_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Log to stderr if the state directory is not writable.
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!(error = %e, "file logging unavailable");
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("trackfetch error: {:#}", err);
        std::process::exit(1);
    }
}
