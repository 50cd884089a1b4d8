use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

// Cache for the Prometheus handle. A `Mutex<Option<…>>` instead of `OnceLock`
// because initialization is fallible and `OnceLock::get_or_try_init` is
// unstable; tests initialize repeatedly and must get the cached handle back.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Port the standalone metrics endpoint listens on.
pub const METRICS_PORT: u16 = 9090;

/// Installs the global metrics recorder and returns a render handle.
///
/// Subsequent calls return the cached handle. A background task runs
/// periodic upkeep so histogram storage does not grow without bound.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE.lock().unwrap();

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let handle_clone = handle.clone();
    tokio::spawn(async move {
        let upkeep_interval = Duration::from_secs(5);
        loop {
            tokio::time::sleep(upkeep_interval).await;
            trace!("running metrics upkeep");
            handle_clone.run_upkeep();
        }
    });

    Ok(handle)
}

/// Installs the global metrics recorder with an HTTP endpoint on
/// `[::]:9090/metrics` for Prometheus scraping.
pub fn init_metrics() -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            METRICS_PORT,
        ))
        .install()
}
