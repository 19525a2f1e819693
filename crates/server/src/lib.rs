//! HTTP boundary crate for the music-production knowledge ask pipeline.
//!
//! Wires the `core`/`rag`/`llm`/`memory` crates into an `AskOrchestrator`
//! behind a small set of Axum routes. Grounded on the teacher's server
//! crate for its ambient stack (router composition, tracing init,
//! graceful shutdown) — the session/tool/websocket/webrtc surface has no
//! counterpart here.

pub mod error;
pub mod http;
pub mod orchestrator;
pub mod response_cache;
pub mod state;

pub use error::ServerError;
pub use http::create_router;
pub use state::AppState;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use askd_config::settings::Settings;

/// Initializes the global tracing subscriber.
///
/// Mirrors the teacher's `init_tracing`: an `EnvFilter`-driven fmt layer,
/// switched between plain and JSON output by `observability.log_json`,
/// with an OTLP exporter layered in behind the `telemetry` feature when
/// `observability.otlp_endpoint` is configured.
pub fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.observability.log_level));

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    #[cfg(feature = "telemetry")]
    {
        if let Some(endpoint) = settings.observability.otlp_endpoint.as_deref() {
            match init_otlp_layer(endpoint) {
                Ok(otlp_layer) => {
                    registry.with(otlp_layer).init();
                    return;
                },
                Err(e) => {
                    eprintln!("warning: failed to initialize OTLP exporter: {e}");
                },
            }
        }
    }

    registry.init();
}

#[cfg(feature = "telemetry")]
fn init_otlp_layer<S>(
    endpoint: &str,
) -> Result<impl tracing_subscriber::Layer<S> + Send + Sync, anyhow::Error>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();

    let tracer = provider.tracer("askd");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}
