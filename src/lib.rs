//! mindrover: EEG headset acquisition, spectrum analysis and closed-loop rover control.
//! Producer side: decoded headset fields → sample ring. Main loop: snapshot →
//! FFT → telemetry + threshold policy → motors.

pub mod acquisition;
pub mod config;
pub mod control;
pub mod display;
pub mod metrics;
pub mod pipeline;
pub mod sim;
pub mod spectrum;
pub mod state_machine;
pub mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use acquisition::ingress::IngressAdapter;
use acquisition::SharedAcquisition;
use config::{ConfigError, PipelineConfig};
use control::ControlPolicy;
use metrics::MetricsRegistry;
use pipeline::{Pipeline, PipelineError};
use state_machine::StatusMachine;

/// Samples per analysis frame.
pub const FFT_N: usize = 128;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "MINDROVER_CONFIG";

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from)
}

/// Load the config at `path`, or the defaults when there is none.
/// A missing or unparsable file falls back to the defaults with a warning.
/// A file that parses but fails validation is an error: running on defaults
/// would silently ignore what the operator asked for.
fn resolve_config(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    match PipelineConfig::load_from_file(path) {
        Err(e @ ConfigError::Invalid(_)) => Err(e),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "config load failed, using defaults");
            Ok(PipelineConfig::default())
        }
        loaded => loaded,
    }
}

/// Environment variable selecting the log format: `json` or anything else for text.
pub const LOG_FORMAT_ENV: &str = "MINDROVER_LOG_FORMAT";

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mindrover=debug")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true);
    if std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f == "json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Run the full pipeline on the host against the synthetic headset.
/// Telemetry goes to stdout, logs to stderr.
pub fn run() -> ExitCode {
    init_tracing();

    info!("mindrover starting");

    let config = match resolve_config(config_path().as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "refusing to start");
            return ExitCode::FAILURE;
        }
    };
    // Powers were range-checked by validation.
    let policy = ControlPolicy::from_config(&config.control).unwrap_or_default();

    let acquisition = Arc::new(SharedAcquisition::<FFT_N>::new());
    let status = Arc::new(StatusMachine::new());
    let metrics = Arc::new(MetricsRegistry::new());

    let mut pipeline = Pipeline::new(
        Arc::clone(&acquisition),
        policy,
        Box::new(sim::LoggingMotors::default()),
        Arc::clone(&status),
        Arc::clone(&metrics),
    )
    .with_trigger(config.trigger)
    .with_display(Box::new(sim::LoggingDisplay));
    if config.telemetry.enabled {
        pipeline = pipeline.with_telemetry(Box::new(std::io::stdout()));
    }

    match pipeline.connect(&mut std::io::sink()) {
        Ok(session) => info!(session_id = %session.id, "session started"),
        Err(e) => {
            error!(error = %e, "session start failed");
            return ExitCode::FAILURE;
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let producer = match sim::spawn_producer(
        config.simulation.clone(),
        IngressAdapter::new(Arc::clone(&acquisition)),
        Arc::clone(&stop),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to spawn headset producer thread");
            return ExitCode::FAILURE;
        }
    };

    let outcome = pipeline.run(&stop, config.max_cycles);

    stop.store(true, Ordering::Relaxed);
    if producer.join().is_err() {
        error!("headset producer thread panicked");
    }

    match serde_json::to_string(&metrics.summary()) {
        Ok(summary) => info!(%summary, "cycle timings"),
        Err(e) => warn!(error = %e, "metrics summary serialization failed"),
    }

    match outcome {
        Ok(cycles) => {
            info!(cycles, status = %status.current(), "mindrover stopped");
            ExitCode::SUCCESS
        }
        Err(PipelineError::Halted(reason)) => {
            error!(%reason, "mindrover halted");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "mindrover failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mindrover-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn no_path_uses_defaults() {
        assert_eq!(resolve_config(None).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn unreadable_or_malformed_file_falls_back() {
        let missing = std::env::temp_dir().join("mindrover-does-not-exist.json");
        assert_eq!(resolve_config(Some(&missing)).unwrap(), PipelineConfig::default());

        let garbled = temp_config("{ nope");
        assert_eq!(resolve_config(Some(&garbled)).unwrap(), PipelineConfig::default());
        std::fs::remove_file(garbled).unwrap();
    }

    #[test]
    fn invalid_file_is_refused() {
        let path = temp_config(r#"{ "control": { "spin_power": 128 } }"#);
        let err = resolve_config(Some(&path)).unwrap_err();
        std::fs::remove_file(path).unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn valid_file_is_used() {
        let path = temp_config(r#"{ "max_cycles": 3, "control": { "drive_power": 127 } }"#);
        let config = resolve_config(Some(&path)).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(config.max_cycles, Some(3));
        assert_eq!(config.control.drive_power, 127);
    }
}
