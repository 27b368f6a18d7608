//! Structured logging for acibuild

use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("acibuild={}", level)))?;

    let registry = Registry::default().with(env_filter);

    if json_output {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .with_span_events(FmtSpan::NONE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Whether acibuild's own debug events are enabled, whatever other targets allow
pub fn is_debug_enabled() -> bool {
    tracing::enabled!(Level::DEBUG)
}

/// Most verbose level enabled for acibuild, as passed to builders
pub fn level_name() -> String {
    let name = if tracing::enabled!(Level::TRACE) {
        "trace"
    } else if tracing::enabled!(Level::DEBUG) {
        "debug"
    } else if tracing::enabled!(Level::INFO) {
        "info"
    } else if tracing::enabled!(Level::WARN) {
        "warn"
    } else if tracing::enabled!(Level::ERROR) {
        "error"
    } else {
        "off"
    };
    name.to_string()
}

/// Log a pipeline state transition
#[macro_export]
macro_rules! log_stage {
    ($stage:expr) => {
        tracing::debug!(stage = %$stage, "Entering stage");
    };
}

#[macro_export]
macro_rules! log_build_start {
    ($command:expr) => {
        tracing::info!(command = %$command, "Building");
    };
}

#[macro_export]
macro_rules! log_build_complete {
    ($fullname:expr, $duration_ms:expr) => {
        tracing::info!(
            fullname = %$fullname,
            duration_ms = $duration_ms,
            "Finished building aci"
        );
    };
}

#[macro_export]
macro_rules! log_cleanup_failure {
    ($err:expr, $what:expr) => {
        tracing::warn!(error = %$err, "Failed to remove {}", $what);
    };
}
