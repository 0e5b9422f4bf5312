//! Metrics recorder initialization and configuration.

use tracing::info;

use crate::error::Result;

/// Handle to the installed recorder, used by the `/metrics` route.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format. Empty without the
    /// `prometheus` feature.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.render()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    /// Labels added to every metric (e.g. `instance`, `region`).
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system. Call once at startup.
///
/// When disabled, the returned handle renders an empty registry and no global
/// recorder is installed, so every `counter!` call stays a no-op.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be built or a global
/// recorder is already installed.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle {
            #[cfg(feature = "prometheus")]
            prometheus_handle: metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle(),
        });
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics exporter initialized");
        Ok(MetricsHandle {
            prometheus_handle: handle,
        })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        let _ = config;
        info!("metrics feature not enabled at compile time");
        Ok(MetricsHandle {})
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(
    config: MetricsRecorderConfig,
) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use {
        crate::{buckets, webhooks},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    };

    let mut builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(webhooks::DISPATCH_DURATION_SECONDS.to_string()),
            &buckets::DISPATCH_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            &buckets::HTTP_DURATION,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    // Installs globally and hands back a render handle; no exporter HTTP
    // listener is spawned since the gateway serves `/metrics` itself.
    Ok(builder.install_recorder()?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_renders_nothing_useful() {
        let handle = init_metrics(MetricsRecorderConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#'));
    }

    #[test]
    fn metric_names_are_prefixed() {
        for name in [
            crate::webhooks::RECEIVED_TOTAL,
            crate::rate_limit::REJECTED_TOTAL,
            crate::api_keys::AUTH_FAILURES_TOTAL,
            crate::plugins::REGISTERED,
            crate::http::REQUESTS_TOTAL,
        ] {
            assert!(name.starts_with("hookgate_"), "{name}");
        }
    }
}
