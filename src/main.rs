use std::io;

use keyforge::config::get_config;
use keyforge::errors::KeyforgeResult;
use keyforge::logging::init_logging;
use keyforge::pipeline::KeyPipeline;
use keyforge::prompt::read_run_request;
use keyforge::report::{ConsoleReporter, FileReportSink};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Interactive entrypoint.
///
/// Asks for an amount and whether to save, then runs the pipeline once.
/// Ctrl-C stops the run between steps; the summary is still printed.
#[tokio::main]
async fn main() -> KeyforgeResult<()> {
    let config = get_config()?;
    init_logging(&config.logging);

    let request = read_run_request(io::stdin().lock(), io::stdout())?;

    let sink = FileReportSink::from_config(&config.report)?;
    let mut pipeline = KeyPipeline::from_config(config, ConsoleReporter::stdout(), sink);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    pipeline
        .run_with_cancel(&request.amount, request.persist, &cancel)
        .await?;

    Ok(())
}
