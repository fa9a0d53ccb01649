//! Service registry - address table with TTL-based liveness
//!
//! Instances register by address; each registration refreshes the entry's
//! last-seen time. Entries whose last-seen time is older than the registry
//! timeout are evicted lazily, the next time the alive set is listed.

pub mod server;

pub use server::{bind, decode_header, encode_header, router, serve, validate_path};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Header carrying a single address on `POST` and the alive list on `GET`
pub const SERVERS_HEADER: &str = "X-Cleanwk-Servers";

/// HTTP path the registry is exposed on unless configured otherwise
pub const DEFAULT_PATH: &str = "/_cleanwk_/registry";

/// Timeout of the global registry
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Process-wide default registry
static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// A registered service instance
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub address: String,
    pub last_seen: Instant,
}

/// Address table with a fixed liveness timeout.
///
/// A zero timeout disables expiry: every address ever registered stays alive.
#[derive(Debug)]
pub struct Registry {
    timeout: Duration,
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl Registry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry, created on first use with [`DEFAULT_TIMEOUT`].
    pub fn global() -> Arc<Registry> {
        GLOBAL
            .get_or_init(|| Arc::new(Registry::new(DEFAULT_TIMEOUT)))
            .clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a heartbeat from `address`.
    ///
    /// Inserts the address if unseen, otherwise refreshes its last-seen time.
    /// Returns `false` (and does nothing) for an empty address.
    pub fn register(&self, address: &str) -> bool {
        if address.is_empty() {
            return false;
        }

        let mut entries = self.lock();
        let now = Instant::now();
        match entries.get_mut(address) {
            Some(entry) => entry.last_seen = now,
            None => {
                debug!(address, "Registered new service");
                entries.insert(
                    address.to_string(),
                    RegistryEntry {
                        address: address.to_string(),
                        last_seen: now,
                    },
                );
            }
        }
        true
    }

    /// Alive addresses in ascending order.
    ///
    /// Expired entries found during the scan are removed from the table.
    pub fn list_alive(&self) -> Vec<String> {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.len();

        let mut alive = Vec::with_capacity(before);
        entries.retain(|address, entry| {
            let keep = self.is_alive(entry, now);
            if keep {
                alive.push(address.clone());
            }
            keep
        });

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, remaining = entries.len(), "Evicted expired services");
        }

        alive.sort_unstable();
        alive
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| self.is_alive(entry, now));
        before - entries.len()
    }

    /// Run [`Registry::evict_expired`] every `period` until `cancel` fires.
    ///
    /// Listing already evicts lazily; the sweeper only bounds how long dead
    /// entries linger when nobody queries.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            info!("Starting registry sweeper (interval: {:?})", period);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Registry sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = registry.evict_expired();
                        if evicted > 0 {
                            info!(evicted, "Swept expired services");
                        }
                    }
                }
            }
        })
    }

    /// Whether `address` currently has an entry, expired or not
    pub fn contains(&self, address: &str) -> bool {
        self.lock().contains_key(address)
    }

    /// Number of entries in the table, including not-yet-evicted expired ones
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn is_alive(&self, entry: &RegistryEntry, now: Instant) -> bool {
        if self.timeout.is_zero() {
            return true;
        }
        // An overflowing deadline is effectively "never"
        match entry.last_seen.checked_add(self.timeout) {
            Some(deadline) => deadline > now,
            None => true,
        }
    }

    // Critical sections never panic, so a poisoned table is still consistent
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RegistryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = Registry::new(DEFAULT_TIMEOUT);

        for _ in 0..5 {
            assert!(registry.register("10.0.0.1:8000"));
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_alive(), vec!["10.0.0.1:8000"]);
    }

    #[test]
    fn test_register_rejects_empty_address() {
        let registry = Registry::new(DEFAULT_TIMEOUT);
        assert!(!registry.register(""));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_alive_is_sorted() {
        let registry = Registry::new(DEFAULT_TIMEOUT);
        registry.register("b:2");
        registry.register("c:3");
        registry.register("a:1");

        assert_eq!(registry.list_alive(), vec!["a:1", "b:2", "c:3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted_on_list() {
        let registry = Registry::new(Duration::from_secs(10));
        registry.register("a:1");

        tokio::time::advance(Duration::from_secs(5)).await;
        registry.register("b:2");
        assert_eq!(registry.list_alive(), vec!["a:1", "b:2"]);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(registry.list_alive(), vec!["b:2"]);
        assert!(!registry.contains("a:1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_exactly_at_deadline() {
        let registry = Registry::new(Duration::from_secs(10));
        registry.register("a:1");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(registry.list_alive().is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_lifetime() {
        let registry = Registry::new(Duration::from_secs(10));
        registry.register("a:1");

        tokio::time::advance(Duration::from_secs(8)).await;
        registry.register("a:1");

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(registry.list_alive(), vec!["a:1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_never_expires() {
        let registry = Registry::new(Duration::ZERO);
        registry.register("a:1");

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert_eq!(registry.list_alive(), vec!["a:1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_counts_removed() {
        let registry = Registry::new(Duration::from_secs(10));
        registry.register("a:1");
        registry.register("b:2");

        tokio::time::advance(Duration::from_secs(11)).await;
        registry.register("c:3");

        assert_eq!(registry.evict_expired(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_without_queries() {
        let registry = Arc::new(Registry::new(Duration::from_secs(10)));
        let cancel = CancellationToken::new();
        let sweeper = registry.spawn_sweeper(Duration::from_secs(5), cancel.clone());

        registry.register("a:1");
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(registry.is_empty());

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[test]
    fn test_global_is_shared() {
        let a = Registry::global();
        let b = Registry::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.timeout(), DEFAULT_TIMEOUT);
    }
}
