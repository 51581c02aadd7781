// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! DNS subsystem: installs the DNS provider configuration into a shared
//! [`DnsSettings`] handle for the lifetime of the server. httpd reads it to
//! report the active zone.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::domain::server_config::DnsConfig;
use crate::domain::service::{Service, ServiceError};

/// Shared view of the active DNS configuration; empty until the DNS service opens
#[derive(Clone, Default)]
pub struct DnsSettings {
    inner: Arc<RwLock<Option<DnsConfig>>>,
}

impl DnsSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<DnsConfig> {
        self.inner.read().clone()
    }

    fn install(&self, config: DnsConfig) {
        *self.inner.write() = Some(config);
    }

    fn clear(&self) {
        *self.inner.write() = None;
    }
}

pub struct DnsService {
    config: DnsConfig,
    settings: DnsSettings,
}

impl DnsService {
    pub fn new(config: DnsConfig, settings: DnsSettings) -> Self {
        Self { config, settings }
    }
}

#[async_trait]
impl Service for DnsService {
    fn name(&self) -> &str {
        "dns"
    }

    async fn open(&self) -> Result<(), ServiceError> {
        let zone = self
            .config
            .zone
            .as_deref()
            .filter(|z| !z.is_empty())
            .ok_or_else(|| ServiceError::Config("dns.zone is required".to_string()))?;

        info!(provider = %self.config.provider, zone, "DNS configuration installed");
        self.settings.install(self.config.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), ServiceError> {
        self.settings.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dns_config(zone: Option<&str>) -> DnsConfig {
        DnsConfig {
            enabled: true,
            zone: zone.map(str::to_string),
            ..DnsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_installs_and_close_clears() {
        let settings = DnsSettings::new();
        let service = DnsService::new(dns_config(Some("megam.io")), settings.clone());

        assert!(settings.current().is_none());
        service.open().await.unwrap();
        assert_eq!(settings.current().unwrap().zone.as_deref(), Some("megam.io"));

        service.close().await.unwrap();
        assert!(settings.current().is_none());
    }

    #[tokio::test]
    async fn test_missing_zone_fails_open() {
        let settings = DnsSettings::new();
        let service = DnsService::new(dns_config(None), settings.clone());

        assert!(matches!(service.open().await, Err(ServiceError::Config(_))));
        assert!(settings.current().is_none());
        // Never opened, still safe to close
        service.close().await.unwrap();
    }
}
