use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ProbeConfig;
use crate::dns::{DnsClient, HickoryDnsClient};
use crate::error::ProbeError;
use crate::health::{HealthStore, InMemoryHealthStore};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: ProbeConfig,
    /// Only cross-invocation mutable state: the TTL-bounded resolver health
    /// cache. Writes are idempotent overwrites keyed by resolver address.
    pub health_store: Arc<dyn HealthStore>,
    pub dns: Arc<dyn DnsClient>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        Ok(Self::with_parts(
            config,
            Arc::new(InMemoryHealthStore::new()),
            Arc::new(HickoryDnsClient::new()?),
        ))
    }

    /// Constructor with injectable store and client, used by tests.
    pub fn with_parts(
        config: ProbeConfig,
        health_store: Arc<dyn HealthStore>,
        dns: Arc<dyn DnsClient>,
    ) -> Self {
        Self {
            config,
            health_store,
            dns,
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_construction_with_defaults() {
        let config = ProbeConfig {
            port: 3000,
            bind: "127.0.0.1".to_string(),
        };
        let state = AppState::new(config).expect("state builds");
        assert_eq!(state.config.port, 3000);
        assert!(state.health_store.get("8.8.8.8").is_none());
    }
}
