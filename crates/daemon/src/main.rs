use std::path::PathBuf;
use std::time::Duration;

use biosignal_daemon::config::load_config;
use biosignal_daemon::runner::{run_session, write_events};
use clap::{value_parser, Arg, Command};
use sensors::MockSensor;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout is reserved for events
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "biosignal_daemon=info,pipeline=info,sensors=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- Argument Parsing ---
    let matches = Command::new("biosignal_daemon")
        .about("Real-time EEG/ECG processing daemon")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .default_value("./config.json")
                .value_parser(value_parser!(PathBuf))
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("duration-secs")
                .long("duration-secs")
                .value_name("SECS")
                .default_value("0")
                .value_parser(value_parser!(u64))
                .help("Stop after this many seconds (0 = run until Ctrl-C)"),
        )
        .arg(
            Arg::new("heart-rate")
                .long("heart-rate")
                .value_name("BPM")
                .value_parser(value_parser!(f32))
                .help("Heart rate of the simulated ECG"),
        )
        .arg(
            Arg::new("drop-every")
                .long("drop-every")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Drop every N-th sensor packet"),
        )
        .get_matches();

    let config_path = matches.get_one::<PathBuf>("config").cloned().unwrap_or_else(|| PathBuf::from("./config.json"));
    let mut config = load_config(&config_path)?;
    if let Some(&bpm) = matches.get_one::<f32>("heart-rate") {
        config.mock.heart_rate_bpm = bpm;
    }
    if let Some(&n) = matches.get_one::<u64>("drop-every") {
        config.mock.drop_every = n;
    }
    let duration = matches.get_one::<u64>("duration-secs").copied().unwrap_or(0);

    tracing::info!("Biosignal daemon starting...");
    let source = MockSensor::new(&config.mock, &config.pipeline)?;

    // --- Event Output ---
    let (event_tx, event_rx) = flume::bounded(config.event_queue_capacity);
    let writer = tokio::task::spawn_blocking(move || write_events(event_rx, std::io::stdout().lock()));

    // --- Graceful Shutdown ---
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let limit = async {
            if duration > 0 {
                tokio::time::sleep(Duration::from_secs(duration)).await
            } else {
                std::future::pending::<()>().await
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
                tracing::info!("Shutdown signal received");
            }
            _ = limit => tracing::info!(secs = duration, "Run duration elapsed"),
        }
        signal_token.cancel();
    });

    let stats = run_session(&config, source, event_tx, shutdown).await?;
    let written = writer.await??;

    tracing::info!(
        samples = stats.samples_filtered,
        spectral_dropped = stats.spectral_dropped,
        beat_dropped = stats.beat_dropped,
        events = written,
        "Biosignal daemon stopped gracefully."
    );
    Ok(())
}
