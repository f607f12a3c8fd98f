//! Pool and endpoint configuration.
//!
//! All tunables follow the same convention: a zero field means "unset", and
//! merging an override into a base config keeps the base value for every
//! unset field. `Default` therefore produces the all-unset config; the
//! role-specific `defaults()` constructors carry the recommended values.

use std::time::Duration;

/// Order in which idle connections are handed back out of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMethod {
    /// Oldest idle connection first. Spreads use evenly across the pool.
    #[default]
    Fifo,
    /// Newest idle connection first. Keeps a small hot set warm and lets
    /// cold connections age out.
    Filo,
}

/// Connection pool tuning for one endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolConfig {
    /// Connections dialed eagerly at pool construction.
    pub init_cap: usize,
    /// Hard ceiling on live connections, in use plus idle.
    pub max_cap: usize,
    /// Idle age at which an unused connection is closed.
    pub idle_timeout: Duration,
    /// Longest an acquire may block before failing.
    pub wait_timeout: Duration,
    /// Read/write deadline per socket operation.
    pub io_timeout: Duration,
    /// Connect deadline.
    pub dial_timeout: Duration,
    /// Idle reuse order.
    pub cache_method: CacheMethod,
}

impl PoolConfig {
    /// Baseline applied by the pool for unset fields: FIFO reuse, one eager
    /// connection, three max, 3s idle and wait, 30s io and dial.
    pub fn defaults() -> Self {
        Self {
            init_cap: 1,
            max_cap: 3,
            idle_timeout: Duration::from_secs(3),
            wait_timeout: Duration::from_secs(3),
            io_timeout: Duration::from_secs(30),
            dial_timeout: Duration::from_secs(30),
            cache_method: CacheMethod::Fifo,
        }
    }

    /// Merges `other` over `self`. Zero fields in `other` keep the base
    /// value.
    pub fn merge(mut self, other: PoolConfig) -> PoolConfig {
        if other.init_cap != 0 {
            self.init_cap = other.init_cap;
        }
        if other.max_cap != 0 {
            self.max_cap = other.max_cap;
        }
        if !other.idle_timeout.is_zero() {
            self.idle_timeout = other.idle_timeout;
        }
        if !other.wait_timeout.is_zero() {
            self.wait_timeout = other.wait_timeout;
        }
        if !other.io_timeout.is_zero() {
            self.io_timeout = other.io_timeout;
        }
        if !other.dial_timeout.is_zero() {
            self.dial_timeout = other.dial_timeout;
        }
        if other.cache_method != CacheMethod::default() {
            self.cache_method = other.cache_method;
        }
        self
    }
}

/// Configuration for a tracker client: pool parameters only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerConfig {
    /// Connection pool tuning.
    pub pool: PoolConfig,
}

impl TrackerConfig {
    /// Tracker-role defaults, identical to the pool baseline.
    pub fn defaults() -> Self {
        Self {
            pool: PoolConfig::defaults(),
        }
    }

    /// Merges `other` over `self` with zero-as-unset semantics.
    pub fn merge(mut self, other: TrackerConfig) -> TrackerConfig {
        self.pool = self.pool.merge(other.pool);
        self
    }
}

/// Configuration for a storage client.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageConfig {
    /// Largest reply body a download is willing to read, in bytes. A server
    /// announcing more fails fast without the body being read. Zero means
    /// unset.
    pub download_size_limit: u64,
    /// Connection pool tuning.
    pub pool: PoolConfig,
}

impl StorageConfig {
    /// Storage-role defaults: FILO reuse, 100s idle timeout, and a 128 MiB
    /// download ceiling.
    pub fn defaults() -> Self {
        Self {
            download_size_limit: 128 * 1024 * 1024,
            pool: PoolConfig {
                cache_method: CacheMethod::Filo,
                idle_timeout: Duration::from_secs(100),
                ..PoolConfig::defaults()
            },
        }
    }

    /// Merges `other` over `self` with zero-as-unset semantics.
    pub fn merge(mut self, other: StorageConfig) -> StorageConfig {
        if other.download_size_limit > 0 {
            self.download_size_limit = other.download_size_limit;
        }
        self.pool = self.pool.merge(other.pool);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_zero_is_identity() {
        let base = StorageConfig::defaults();
        let merged = base.merge(StorageConfig::default());

        assert_eq!(merged.download_size_limit, base.download_size_limit);
        assert_eq!(merged.pool.init_cap, base.pool.init_cap);
        assert_eq!(merged.pool.max_cap, base.pool.max_cap);
        assert_eq!(merged.pool.idle_timeout, base.pool.idle_timeout);
        assert_eq!(merged.pool.wait_timeout, base.pool.wait_timeout);
        assert_eq!(merged.pool.io_timeout, base.pool.io_timeout);
        assert_eq!(merged.pool.dial_timeout, base.pool.dial_timeout);
        assert_eq!(merged.pool.cache_method, CacheMethod::Filo);
    }

    #[test]
    fn test_merge_is_right_biased_on_set_fields() {
        let base = StorageConfig::defaults();
        let merged = base.merge(StorageConfig {
            download_size_limit: 1024,
            pool: PoolConfig {
                max_cap: 8,
                wait_timeout: Duration::from_secs(1),
                ..PoolConfig::default()
            },
        });

        assert_eq!(merged.download_size_limit, 1024);
        assert_eq!(merged.pool.max_cap, 8);
        assert_eq!(merged.pool.wait_timeout, Duration::from_secs(1));
        // Unset override fields keep the base values.
        assert_eq!(merged.pool.init_cap, base.pool.init_cap);
        assert_eq!(merged.pool.io_timeout, base.pool.io_timeout);
        assert_eq!(merged.pool.cache_method, CacheMethod::Filo);
    }

    #[test]
    fn test_role_defaults() {
        let tracker = TrackerConfig::defaults();
        assert_eq!(tracker.pool.cache_method, CacheMethod::Fifo);
        assert_eq!(tracker.pool.idle_timeout, Duration::from_secs(3));
        assert_eq!(tracker.pool.init_cap, 1);
        assert_eq!(tracker.pool.max_cap, 3);

        let storage = StorageConfig::defaults();
        assert_eq!(storage.pool.cache_method, CacheMethod::Filo);
        assert_eq!(storage.pool.idle_timeout, Duration::from_secs(100));
        assert_eq!(storage.download_size_limit, 128 * 1024 * 1024);
    }

    #[test]
    fn test_cache_method_override() {
        let base = TrackerConfig::defaults();
        let merged = base.merge(TrackerConfig {
            pool: PoolConfig {
                cache_method: CacheMethod::Filo,
                ..PoolConfig::default()
            },
        });
        assert_eq!(merged.pool.cache_method, CacheMethod::Filo);
    }
}
