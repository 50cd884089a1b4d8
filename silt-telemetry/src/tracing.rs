use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the tracing subscriber")]
    Init(#[source] tracing_subscriber::util::TryInitError),
}

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`. With `json` set,
/// records are emitted as JSON lines for log shippers; otherwise the
/// human-readable format is used. `service` is attached to every record.
pub fn init_tracing(service: &str, json: bool) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .try_init()
            .map_err(TracingError::Init)?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(TracingError::Init)?;
    }

    ::tracing::info!(service, "tracing initialized");
    Ok(())
}
