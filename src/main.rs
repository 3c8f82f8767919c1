use clap::Parser;

use synapse::Result;
use synapse::cli::{Cli, Command, PulseArgs};
use synapse::config::LogConfig;
use synapse::logger::{LogLevel, Logger, SharedSink};
use synapse::worker::{ShutdownReport, WorkerLifecycle};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Used only until the configured logger exists.
    let fallback = Logger::new(SharedSink::new(std::io::stderr()), LogLevel::Info);

    let logger = match build_logger(&cli) {
        Ok(logger) => logger,
        Err(e) => fallback.fatal("unable to configure logging", &[("error", &e)]),
    };

    // Dependency-level events share the logger's sink and lock.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(logger.sink().clone())
        .with_ansi(false)
        .with_target(false)
        .init();

    match cli.command {
        Command::Pulse(args) => match pulse(args, &logger).await {
            Ok(report) => {
                let level = if report.forced.is_empty() {
                    LogLevel::Info
                } else {
                    LogLevel::Warn
                };
                logger.note(
                    level,
                    "shutdown complete",
                    &[
                        ("signal", &report.signal),
                        ("heartbeats", &report.heartbeats),
                        ("forced", &report.forced.join(",")),
                    ],
                );
            }
            Err(e) => logger.fatal("worker failed", &[("error", &e)]),
        },
    }
}

/// The one default logger; everything below receives it explicitly.
fn build_logger(cli: &Cli) -> Result<Logger> {
    let mut config = LogConfig::from_env()?;
    if let Some(level) = cli.log_level {
        config.level = level;
    }
    Ok(Logger::from_config(&config)?)
}

async fn pulse(args: PulseArgs, logger: &Logger) -> Result<ShutdownReport> {
    let settings = args.settings();
    settings.validate()?;

    let mut worker = WorkerLifecycle::new(settings, logger.with_prefix("pulse"));
    Ok(worker.run().await?)
}
