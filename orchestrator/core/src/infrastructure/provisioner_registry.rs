// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Registry - Provider Id to Backend Resolution
//
// Populated once at startup by whoever wires the process together, then
// shared read-only behind an Arc. There is no default entry:
// an unknown provider id resolves to nothing.

use crate::domain::provisioner::Provisioner;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<String, Arc<dyn Provisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its own provider id, replacing any previous one
    pub fn register(&mut self, provisioner: Arc<dyn Provisioner>) {
        let provider = provisioner.provider().to_string();
        if self.provisioners.contains_key(&provider) {
            warn!("Provisioner '{}' registered twice, keeping the latest", provider);
        }
        info!("Registered provisioner: {}", provider);
        self.provisioners.insert(provider, provisioner);
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.register(provisioner);
        self
    }

    pub fn lookup(&self, provider: &str) -> Option<Arc<dyn Provisioner>> {
        self.provisioners.get(provider).cloned()
    }

    /// Registered provider ids, sorted
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.provisioners.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.provisioners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::compute_box::ComputeBox;
    use crate::domain::provisioner::ProvisionError;
    use async_trait::async_trait;
    use std::io::Write;

    struct NamedProvisioner(&'static str);

    #[async_trait]
    impl Provisioner for NamedProvisioner {
        fn provider(&self) -> &str {
            self.0
        }

        async fn destroy(
            &self,
            _target: &ComputeBox,
            _output: &mut (dyn Write + Send),
        ) -> Result<(), ProvisionError> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_has_no_fallback() {
        let registry = ProvisionerRegistry::new()
            .with(Arc::new(NamedProvisioner("one")))
            .with(Arc::new(NamedProvisioner("docker")));

        assert_eq!(registry.lookup("docker").unwrap().provider(), "docker");
        assert!(registry.lookup("bare-metal").is_none());
        assert!(registry.lookup("").is_none());
        assert_eq!(registry.providers(), vec!["docker".to_string(), "one".to_string()]);
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut registry = ProvisionerRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(NamedProvisioner("docker")));
        registry.register(Arc::new(NamedProvisioner("docker")));
        assert_eq!(registry.providers().len(), 1);
    }
}
