//! Tracing subscriber setup, with optional OTLP export.
//!
//! Spans ship to an OpenTelemetry collector only when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set; otherwise only the fmt layer runs,
//! so local runs need no collector.

use anyhow::Result;
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace::TracerProvider, Resource};
use std::{sync::OnceLock, time::Duration};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

// Held so spans can be flushed at shutdown.
static PROVIDER: OnceLock<TracerProvider> = OnceLock::new();

/// Install the global subscriber. Must run inside the Tokio runtime when
/// OTLP export is enabled, since the batch processor spawns on it.
pub fn init(verbosity_level: tracing::Level) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false);

    // RUST_LOG=
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.into())
        .from_env_lossy();

    let registry = Registry::default().with(fmt_layer).with(env_filter);

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_timeout(Duration::from_secs(3))
            .build()?;
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", env!("CARGO_PKG_NAME")),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]))
            .build();
        let provider = PROVIDER.get_or_init(|| provider);
        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));

        tracing::subscriber::set_global_default(registry.with(OpenTelemetryLayer::new(tracer)))?;
    } else {
        tracing::subscriber::set_global_default(registry)?;
    }

    Ok(())
}

/// Flush pending spans; safe to call when OTLP was never enabled.
pub fn shutdown() {
    if let Some(provider) = PROVIDER.get() {
        if let Err(err) = provider.shutdown() {
            eprintln!("failed to shut down tracer provider: {err}");
        }
    }
}
