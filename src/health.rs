//! Resolver health cache.
//!
//! Liveness is probed against a small set of reference domains with
//! first-success-wins semantics, and the result (positive or negative) is
//! cached per resolver address for a TTL so dead resolvers are not hammered
//! on every run. The store is injected so the orchestrator never touches a
//! module-level singleton.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::select_ok;
use futures::Future;
use tokio::time::timeout;
use tracing::debug;

use crate::config::{HEALTH_PROBE_DOMAINS, HEALTH_PROBE_TIMEOUT_SECS, HEALTH_TTL_SECS};
use crate::dns::DnsClient;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverHealth {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl ResolverHealth {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.checked_at).num_seconds() < HEALTH_TTL_SECS
    }
}

pub trait HealthStore: Send + Sync {
    fn get(&self, resolver: &str) -> Option<ResolverHealth>;
    fn put(&self, resolver: &str, health: ResolverHealth);
}

pub struct InMemoryHealthStore {
    entries: RwLock<HashMap<String, ResolverHealth>>,
}

impl InMemoryHealthStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryHealthStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStore for InMemoryHealthStore {
    fn get(&self, resolver: &str) -> Option<ResolverHealth> {
        self.entries
            .read()
            .expect("health store lock poisoned")
            .get(resolver)
            .cloned()
    }

    fn put(&self, resolver: &str, health: ResolverHealth) {
        self.entries
            .write()
            .expect("health store lock poisoned")
            .insert(resolver.to_string(), health);
    }
}

/// Return the resolver's health, probing only when the cached record has
/// expired. Probes race the reference domains concurrently; the first
/// success settles the check and the remaining attempts are discarded.
pub async fn check_resolver_health(
    client: &dyn DnsClient,
    store: &dyn HealthStore,
    resolver: &str,
) -> ResolverHealth {
    let now = Utc::now();
    if let Some(cached) = store.get(resolver) {
        if cached.is_fresh(now) {
            debug!("health cache hit for {}", resolver);
            return cached;
        }
    }

    type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, String>> + Send + 'a>>;
    let probes: Vec<ProbeFuture<'_>> = HEALTH_PROBE_DOMAINS
        .iter()
        .map(|domain| {
            let future: ProbeFuture<'_> = Box::pin(async move {
                let start = Instant::now();
                match timeout(
                    Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECS),
                    client.query(resolver, domain),
                )
                .await
                {
                    Ok(Ok(_ip)) => Ok(start.elapsed().as_millis() as u64),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("probe of {} timed out", domain)),
                }
            });
            future
        })
        .collect();

    let health = match select_ok(probes).await {
        Ok((response_time_ms, _discarded)) => ResolverHealth {
            healthy: true,
            checked_at: now,
            response_time_ms,
            error: None,
        },
        Err(last_error) => ResolverHealth {
            healthy: false,
            checked_at: now,
            response_time_ms: 0,
            error: Some(format!("all probe domains failed: {}", last_error)),
        },
    };

    store.put(resolver, health.clone());
    health
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingClient {
        queries: AtomicU32,
        healthy: bool,
    }

    #[async_trait]
    impl DnsClient for CountingClient {
        async fn query(&self, _server: &str, _domain: &str) -> Result<IpAddr, ProbeError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.healthy {
                Ok("203.0.113.7".parse().unwrap())
            } else {
                Err(ProbeError::ResolverQuery("refused".into()))
            }
        }

        async fn lookup_system(&self, _domain: &str) -> Result<Vec<IpAddr>, ProbeError> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_freshness_window() {
        let health = ResolverHealth {
            healthy: true,
            checked_at: Utc::now(),
            response_time_ms: 12,
            error: None,
        };
        assert!(health.is_fresh(Utc::now()));
        let later = Utc::now() + chrono::Duration::seconds(HEALTH_TTL_SECS + 1);
        assert!(!health.is_fresh(later));
    }

    #[test]
    fn test_store_get_put_roundtrip() {
        let store = InMemoryHealthStore::new();
        assert!(store.get("8.8.8.8").is_none());
        let health = ResolverHealth {
            healthy: false,
            checked_at: Utc::now(),
            response_time_ms: 0,
            error: Some("down".into()),
        };
        store.put("8.8.8.8", health.clone());
        assert_eq!(store.get("8.8.8.8"), Some(health));
    }

    #[tokio::test]
    async fn test_fresh_entry_short_circuits_probing() {
        let client = CountingClient {
            queries: AtomicU32::new(0),
            healthy: true,
        };
        let store = InMemoryHealthStore::new();

        let first = check_resolver_health(&client, &store, "1.1.1.1").await;
        assert!(first.healthy);
        let probes_after_first = client.queries.load(Ordering::SeqCst);
        assert!(probes_after_first >= 1);

        // Second call within the TTL must return the identical record with
        // no further network activity.
        let second = check_resolver_health(&client, &store, "1.1.1.1").await;
        assert_eq!(first, second);
        assert_eq!(client.queries.load(Ordering::SeqCst), probes_after_first);
    }

    #[tokio::test]
    async fn test_all_probe_domains_failing_caches_negative_result() {
        let client = CountingClient {
            queries: AtomicU32::new(0),
            healthy: false,
        };
        let store = InMemoryHealthStore::new();

        let health = check_resolver_health(&client, &store, "192.0.2.1").await;
        assert!(!health.healthy);
        assert!(health.error.as_deref().unwrap().contains("all probe domains failed"));

        // Negative result is cached too.
        let cached = store.get("192.0.2.1").expect("negative result cached");
        assert!(!cached.healthy);
        let probes = client.queries.load(Ordering::SeqCst);
        let again = check_resolver_health(&client, &store, "192.0.2.1").await;
        assert!(!again.healthy);
        assert_eq!(client.queries.load(Ordering::SeqCst), probes);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_reprobe() {
        let client = CountingClient {
            queries: AtomicU32::new(0),
            healthy: true,
        };
        let store = InMemoryHealthStore::new();
        store.put(
            "9.9.9.9",
            ResolverHealth {
                healthy: false,
                checked_at: Utc::now() - chrono::Duration::seconds(HEALTH_TTL_SECS + 5),
                response_time_ms: 0,
                error: Some("stale".into()),
            },
        );

        let health = check_resolver_health(&client, &store, "9.9.9.9").await;
        assert!(health.healthy);
        assert!(client.queries.load(Ordering::SeqCst) >= 1);
    }
}
