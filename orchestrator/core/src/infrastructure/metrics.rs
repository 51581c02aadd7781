// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Metrics daemon: installs the Prometheus recorder as the process-wide
//! `metrics` recorder and serves the scrape endpoint.

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::server_config::MetricsdConfig;
use crate::domain::service::{Service, ServiceError};

pub struct MetricsService {
    config: MetricsdConfig,
    exporter: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsService {
    pub fn new(config: MetricsdConfig) -> Self {
        Self {
            config,
            exporter: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Service for MetricsService {
    fn name(&self) -> &str {
        "metricsd"
    }

    async fn open(&self) -> Result<(), ServiceError> {
        if self.exporter.lock().is_some() {
            return Err(ServiceError::AlreadyOpen);
        }

        let addr: SocketAddr = self
            .config
            .bind_address
            .parse()
            .map_err(|e| ServiceError::Config(format!("metricsd.bind_address: {}", e)))?;

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(addr)
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("prometheus exporter: {}", e)))?;

        metrics::set_global_recorder(recorder)
            .map_err(|e| ServiceError::Runtime(format!("metrics recorder already installed: {}", e)))?;

        let handle = tokio::spawn(async move {
            if exporter.await.is_err() {
                warn!("Prometheus exporter stopped unexpectedly");
            }
        });
        *self.exporter.lock() = Some(handle);

        info!("Metrics exposed on http://{}/metrics", addr);
        Ok(())
    }

    async fn close(&self) -> Result<(), ServiceError> {
        if let Some(handle) = self.exporter.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}
