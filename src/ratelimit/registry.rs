//! Named bucket definitions with prototype-based defaulting.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::bucket::{Bucket, Expire};

/// Bucket id whose definition doubles as the template for unknown ids.
pub const DEFAULT_BUCKET: &str = "default";

/// The `bucket_id -> bucket` table a manager owns.
///
/// Unknown ids are materialized on first use from a copy of the default
/// template and keep that copy for the registry's lifetime, so later changes
/// to the template only affect ids that haven't been seen yet.
pub(crate) struct BucketRegistry<T> {
    /// Manager kind, for logs
    kind: &'static str,
    buckets: DashMap<String, Arc<Bucket<T>>>,
    default_template: RwLock<Bucket<T>>,
}

impl<T: Expire> BucketRegistry<T> {
    pub(crate) fn new(kind: &'static str, default_template: Bucket<T>) -> Self {
        Self {
            kind,
            buckets: DashMap::new(),
            default_template: RwLock::new(default_template),
        }
    }

    /// Get a bucket without materializing it.
    pub(crate) fn get(&self, bucket_id: &str) -> Option<Arc<Bucket<T>>> {
        self.buckets.get(bucket_id).map(|bucket| bucket.clone())
    }

    /// Get a bucket, copying the default template if the id is new.
    pub(crate) fn get_or_default(&self, bucket_id: &str) -> Arc<Bucket<T>> {
        if let Some(bucket) = self.buckets.get(bucket_id) {
            return bucket.clone();
        }

        self.buckets
            .entry(bucket_id.to_string())
            .or_insert_with(|| {
                info!(
                    kind = self.kind,
                    bucket = %bucket_id,
                    "No bucket configured, falling back to the 'default' bucket"
                );
                Arc::new(self.default_template.read().copy())
            })
            .clone()
    }

    /// Install a bucket definition, replacing any existing one.
    ///
    /// Setting [`DEFAULT_BUCKET`] also replaces the template.
    pub(crate) fn set(&self, bucket_id: &str, bucket: Bucket<T>) {
        debug!(kind = self.kind, bucket = %bucket_id, resource = %bucket.resource(), "Setting bucket");
        if bucket_id == DEFAULT_BUCKET {
            *self.default_template.write() = bucket.copy();
        }

        self.buckets.insert(bucket_id.to_string(), Arc::new(bucket));
    }

    /// Sweep every bucket. Returns the number of states removed.
    pub(crate) fn sweep(&self, now: Instant) -> usize {
        let buckets: Vec<Arc<Bucket<T>>> = self.buckets.iter().map(|entry| entry.value().clone()).collect();
        buckets.iter().map(|bucket| bucket.sweep(now)).sum()
    }

    /// Number of materialized buckets.
    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }
}
