#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The top-level configuration for the `conveyor-server` library.
///
/// This struct aggregates the tunables shared by every server built from one
/// [`crate::registry::Registry`]: queue sizing, deduplication-cache lifetime
/// and the default worker-pool size. It is typically deserialized from a
/// configuration file and passed to [`crate::registry::Registry::new`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ConveyorConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub queue: QueueConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dedup: DedupConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub workers: WorkerConfig,
}

/// Sizing of the per-server request queue.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct QueueConfig {
    /// Maximum number of buffered requests per server. Submissions block once
    /// the queue is full; this is the only backpressure mechanism.
    pub capacity: usize,
}

/// Behavior of the per-server deduplication cache.
///
/// The cache capacity always equals the queue capacity; only the entry
/// lifetime is tunable here.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct DedupConfig {
    /// Absolute lifetime of a recorded hash, in seconds. Entries expire after
    /// this long even if the in-flight request never finished, bounding how
    /// stale the cache can get.
    pub ttl_secs: u64,
}

/// Default sizing of the per-server worker pool.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct WorkerConfig {
    /// Worker count for servers that do not set one through
    /// [`crate::server::Options::workers`]. `None` means twice the available
    /// hardware parallelism.
    pub default_count: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 100_000 }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}
