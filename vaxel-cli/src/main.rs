//! ## vaxel-cli
//! **Controller daemon**
//!
//! Loads the layered configuration, applies command line overrides, starts
//! the controller with the configured forwarding policy and runs it until
//! SIGINT/SIGTERM or a fatal handler fault.

use anyhow::Context;
use clap::Parser;
use opentelemetry::KeyValue;
use tracing::{debug, error, info};
use vaxel_engine::Controller;
use vaxel_telemetry::EventLogger;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let log_file = cli.daemon.then_some(config.telemetry.log_file.as_path());
    EventLogger::init(&config.telemetry.log_level, log_file)
        .context("Cannot initialise logging")?;

    let (policy, options) = commands::forwarding(&config)?;
    let mut controller = Controller::new(commands::controller_config(&config)?)
        .context("Cannot start controller")?;
    vaxel_forwarding::install(&mut controller, policy, options)?;

    info!(
        addr = ?controller.local_addr(),
        %policy,
        "Controller ready"
    );
    EventLogger::log_event(
        "startup",
        &[
            KeyValue::new("openflow_addr", config.transport.openflow_addr.clone()),
            KeyValue::new("policy", policy.to_string()),
        ],
    );

    let shutdown = controller.shutdown_handle();
    let services = controller.services();
    let mut run = tokio::task::spawn_blocking(move || controller.run());

    let outcome = tokio::select! {
        outcome = &mut run => outcome,
        () = shutdown_signal() => {
            info!("Termination signal received, shutting down");
            shutdown.shutdown();
            run.await
        }
    };

    if config.telemetry.metrics {
        match services.metrics.gather_metrics() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => error!(error = %e, "Cannot gather metrics"),
        }
    }

    match outcome {
        Ok(result) => result.context("Controller stopped with a fatal error"),
        Err(e) if e.is_panic() => Err(anyhow::anyhow!("Controller panicked")),
        Err(e) => Err(e).context("Controller task failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
