//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const ENV_METRICS_ENABLED: &str = "FLOODGATE_METRICS_ENABLED";
const ENV_METRICS_PORT: &str = "FLOODGATE_METRICS_PORT";
const DEFAULT_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are recorded.
    pub enabled: bool,
    /// Address for the scrape listener.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: listen_addr(DEFAULT_PORT),
        }
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    ///
    /// Setting `FLOODGATE_METRICS_PORT` alone enables metrics.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::resolve(settings, |key| std::env::var(key).ok())
    }

    fn resolve<F>(settings: Option<&MetricsSettings>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = settings.and_then(|s| s.enabled).unwrap_or(false);
        let port = settings.and_then(|s| s.port).unwrap_or(DEFAULT_PORT);

        let mut config = Self {
            enabled,
            listen_addr: listen_addr(port),
        };

        if let Some(port) = lookup(ENV_METRICS_PORT).and_then(|v| v.trim().parse::<u16>().ok()) {
            config.enabled = true;
            config.listen_addr = listen_addr(port);
        }
        if let Some(enabled) = lookup(ENV_METRICS_ENABLED).map(|v| parse_bool(&v)) {
            config.enabled = enabled;
        }

        config
    }
}

/// Installs the Prometheus recorder.
///
/// With `expose`, also serves `/metrics` on the configured listener from a
/// background thread. Without it, the returned handle can render the
/// snapshot on demand.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed or the
/// listener cannot bind.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let handle = if expose {
        install_listener(builder.with_http_listener(config.listen_addr))?
    } else {
        builder
            .install_recorder()
            .map_err(|e| Error::OperationFailed {
                operation: "metrics_recorder_install".to_string(),
                cause: e.to_string(),
            })?
    };

    Ok(Some(handle))
}

/// Binds the listener inside a dedicated runtime and serves it from a
/// background thread.
fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;

    let (recorder, exporter) = {
        let _guard = runtime.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })?;

    std::thread::Builder::new()
        .name("floodgate-metrics-http".to_string())
        .spawn(move || {
            if let Err(e) = runtime.block_on(exporter) {
                tracing::error!(error = ?e, "Prometheus exporter stopped");
            }
        })
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;

    Ok(handle)
}

const fn listen_addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    fn resolve(settings: Option<&MetricsSettings>, vars: &HashMap<&str, &str>) -> MetricsConfig {
        MetricsConfig::resolve(settings, |key| vars.get(key).map(ToString::to_string))
    }

    #[test]
    fn test_disabled_by_default() {
        let config = resolve(None, &HashMap::new());
        assert_eq!(config, MetricsConfig::default());
        assert!(!config.enabled);
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_settings() {
        let settings = MetricsSettings {
            enabled: Some(true),
            port: Some(9464),
        };
        let config = resolve(Some(&settings), &HashMap::new());
        assert!(config.enabled);
        assert_eq!(config.listen_addr.port(), 9464);
    }

    #[test]
    fn test_port_env_enables() {
        let vars = HashMap::from([(ENV_METRICS_PORT, "9100")]);
        let config = resolve(None, &vars);
        assert!(config.enabled);
        assert_eq!(config.listen_addr.port(), 9100);
    }

    #[test]
    fn test_enabled_env_wins() {
        let vars = HashMap::from([(ENV_METRICS_PORT, "9100"), (ENV_METRICS_ENABLED, "no")]);
        assert!(!resolve(None, &vars).enabled);
    }

    #[test]
    fn test_bad_port_ignored() {
        let vars = HashMap::from([(ENV_METRICS_PORT, "http")]);
        let config = resolve(None, &vars);
        assert!(!config.enabled);
        assert_eq!(config.listen_addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_install_disabled_is_noop() {
        let handle = install_prometheus(&MetricsConfig::default(), true).unwrap();
        assert!(handle.is_none());
    }

    // The only test in this binary that installs the global recorder.
    #[test]
    fn test_listener_serves_scrapes() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = MetricsConfig {
            enabled: true,
            listen_addr: listen_addr(port),
        };

        let handle = install_prometheus(&config, true).unwrap().unwrap();
        ::metrics::counter!("floodgate_listener_test_total").increment(1);

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains("floodgate_listener_test_total"));
        assert!(handle.render().contains("floodgate_listener_test_total"));
    }
}
