use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Key/value storage for read models, split into partitions.
///
/// Secondary projections partition by dimension space point hash so that a
/// dimension move or shine-through rewrites or copies one partition in bulk.
/// Everything stored here is disposable: `clear` followed by a replay must
/// rebuild it.
pub trait PartitionedStore<P, K, V>: Send + Sync {
    fn get(&self, partition: &P, key: &K) -> Option<V>;
    fn upsert(&self, partition: P, key: K, value: V);
    fn remove(&self, partition: &P, key: &K) -> Option<V>;
    /// Every value of a partition, in key order.
    fn list(&self, partition: &P) -> Vec<V>;
    fn partitions(&self) -> Vec<P>;
    fn clear_partition(&self, partition: &P);
    fn clear(&self);
}

impl<P, K, V, S> PartitionedStore<P, K, V> for Arc<S>
where
    S: PartitionedStore<P, K, V> + ?Sized,
{
    fn get(&self, partition: &P, key: &K) -> Option<V> {
        (**self).get(partition, key)
    }

    fn upsert(&self, partition: P, key: K, value: V) {
        (**self).upsert(partition, key, value)
    }

    fn remove(&self, partition: &P, key: &K) -> Option<V> {
        (**self).remove(partition, key)
    }

    fn list(&self, partition: &P) -> Vec<V> {
        (**self).list(partition)
    }

    fn partitions(&self) -> Vec<P> {
        (**self).partitions()
    }

    fn clear_partition(&self, partition: &P) {
        (**self).clear_partition(partition)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// In-memory partitioned store for tests/dev.
#[derive(Debug)]
pub struct InMemoryPartitionedStore<P, K, V> {
    inner: RwLock<BTreeMap<P, BTreeMap<K, V>>>,
}

impl<P, K, V> InMemoryPartitionedStore<P, K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<P, K, V> Default for InMemoryPartitionedStore<P, K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, K, V> PartitionedStore<P, K, V> for InMemoryPartitionedStore<P, K, V>
where
    P: Clone + Ord + Send + Sync + 'static,
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, partition: &P, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(partition).and_then(|rows| rows.get(key)).cloned()
    }

    fn upsert(&self, partition: P, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(partition).or_default().insert(key, value);
        }
    }

    fn remove(&self, partition: &P, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        let rows = map.get_mut(partition)?;
        let removed = rows.remove(key);
        if rows.is_empty() {
            map.remove(partition);
        }
        removed
    }

    fn list(&self, partition: &P) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        map.get(partition)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn partitions(&self) -> Vec<P> {
        match self.inner.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(_) => vec![],
        }
    }

    fn clear_partition(&self, partition: &P) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(partition);
        }
    }

    fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
    }
}
