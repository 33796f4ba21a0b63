//! Logging and trace export for courier processes.
//!
//! Call [`init_tracing`] once at process start-up and hold the returned
//! guard until exit.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `COURIER_LOG_FORMAT=json` | Newline-delimited JSON logs instead of the compact format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | When set, spans are also exported over OTLP/HTTP to this collector. |

use std::str::FromStr;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

impl LogFormat {
    /// Read `COURIER_LOG_FORMAT`, falling back to `fallback` when unset or
    /// unrecognised.
    pub fn from_env_or(fallback: LogFormat) -> LogFormat {
        std::env::var("COURIER_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback)
    }
}

/// Install the global subscriber.
///
/// `format` is the configured log format; `COURIER_LOG_FORMAT` overrides
/// it.  Spans are exported over OTLP only when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set and the exporter can be built.
pub fn init_tracing(service_name: &str, format: LogFormat) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env_or(format);
    let provider = build_provider(service_name);

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("courier")));
    let json_layer =
        (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());
    let compact_layer =
        (format == LogFormat::Compact).then(|| tracing_subscriber::fmt::layer().compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(json_layer)
        .with(compact_layer)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts the OTLP provider down (flushing pending spans) when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[courier] OpenTelemetry provider shutdown error: {e}");
        }
    }
}

fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[courier] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: no async runtime exists yet when this runs.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}
