use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use flightwatch_core::network::MetricsSink;
use flightwatch_telemetry::config::Settings;
use flightwatch_telemetry::pipeline::TelemetryPipeline;
use flightwatch_telemetry::source::JsonLinesSource;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flightwatch")]
#[command(about = "Airport noise, emission and climb/descent telemetry from aircraft positions", long_about = None)]
struct Cli {
    /// TOML settings file.
    #[arg(long, env = "FLIGHTWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Newline-delimited JSON position reports; `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: String,
    /// Metrics store address, overrides `sink.host` and `sink.port`.
    #[arg(long, value_name = "HOST:PORT", value_parser = parse_sink_address)]
    sink: Option<(String, u16)>,
    /// Number of classification workers.
    #[arg(long)]
    parallelism: Option<usize>,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Filter directives, e.g. `flightwatch_core=debug`. Defaults to `RUST_LOG`.
    #[arg(long)]
    log_filter: Option<String>,
}

fn parse_sink_address(value: &str) -> Result<(String, u16), String> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected HOST:PORT, got {value:?}"))?;
    if host.is_empty() {
        return Err(format!("missing host in {value:?}"));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("invalid port in {value:?}: {e}"))?;
    Ok((host.to_string(), port))
}

fn init_tracing(cli: &Cli) {
    let level = cli.log_level.parse().unwrap_or(LevelFilter::INFO);
    let directives = cli
        .log_filter
        .clone()
        .or_else(|| std::env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .parse_lossy(directives),
        )
        .with_target(true)
        .with_thread_names(true)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some((host, port)) = &cli.sink {
        settings.sink.host = host.clone();
        settings.sink.port = *port;
    }
    if let Some(parallelism) = cli.parallelism {
        settings.pipeline.parallelism = parallelism;
    }
    settings.validate()?;
    Ok(settings)
}

fn open_input(input: &str) -> Result<Box<dyn BufRead + Send>> {
    if input == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let path = Path::new(input);
    let file = File::open(path).with_context(|| format!("failed to open input {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let settings = load_settings(&cli)?;
    let input = open_input(&cli.input)?;
    let pipeline = TelemetryPipeline::new(settings.pipeline.clone(), &settings.reference)?;
    info!(
        input = %cli.input,
        sink = %settings.sink.address(),
        parallelism = settings.pipeline.parallelism,
        "flightwatch starting"
    );

    let shutdown = pipeline.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing after the current input line");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    let (sink, writer) = MetricsSink::spawn(settings.sink.to_sink_config());
    let outcome = tokio::task::spawn_blocking(move || {
        let mut source = JsonLinesSource::new(input);
        let report = pipeline.run(&mut source, sink);
        (report, source.malformed())
    })
    .await
    .context("pipeline task panicked")?;

    // The pipeline dropped its sink handle: the writer flushes and exits.
    let stats = writer.await.context("metrics sink task panicked")?;
    info!(
        sent = stats.sent,
        dropped = stats.dropped,
        reconnects = stats.reconnects,
        "metrics sink closed"
    );

    let (report, malformed) = outcome;
    let report = report?;
    if malformed > 0 {
        warn!(malformed, "skipped malformed input");
    }
    info!(
        records = report.records_read,
        filtered = report.records_filtered,
        late = report.late_events(),
        metrics = report.metrics_emitted,
        "flightwatch finished"
    );
    Ok(())
}
