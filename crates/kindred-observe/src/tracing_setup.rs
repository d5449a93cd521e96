//! Process-wide log and span setup.
//!
//! Events go to stderr, either human-readable or as JSON lines. Spans can
//! also be exported through OpenTelemetry to stdout for inspecting the
//! `gen_ai` calls the decision components make.
//!
//! # Usage
//!
//! ```no_run
//! use kindred_observe::tracing_setup::{LogFormat, init_tracing};
//!
//! // Warnings only, human-readable
//! init_tracing(0, LogFormat::Pretty, false).unwrap();
//!
//! // Debug logs as JSON with OpenTelemetry spans on stdout
//! init_tracing(2, LogFormat::Json, true).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

use std::sync::OnceLock;

/// Held for [`shutdown_tracing`].
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Default filter directive for a `-v` count.
///
/// 0 keeps warnings, 1 adds info from kindred crates, 2 adds debug, 3+ traces everything.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,kindred=info,kindred_core=info,kindred_infra=info,kindred_api=info",
        2 => "info,kindred=debug,kindred_core=debug,kindred_infra=debug,kindred_api=debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the verbosity-derived filter. Fails if a subscriber
/// is already installed.
pub fn init_tracing(
    verbosity: u8,
    format: LogFormat,
    enable_otel: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };

    let otel_layer = if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("kindred");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush exported spans. Does nothing when export was never enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("span export did not shut down cleanly: {e}");
        }
    }
}
