use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

/// Creates the per-key-type cache storage used by a [`DataLoader`](crate::DataLoader).
pub trait CacheFactory: Send + Sync + 'static {
    fn create<K, V>(&self) -> Box<dyn CacheStorage<Key = K, Value = V>>
    where
        K: Send + Sync + Clone + Eq + Hash + 'static,
        V: Send + Sync + Clone + 'static;
}

pub trait CacheStorage: Send + Sync + 'static {
    type Key: Send + Sync + Clone + Eq + Hash + 'static;
    type Value: Send + Sync + Clone + 'static;

    fn get(&mut self, key: &Self::Key) -> Option<&Self::Value>;
    fn insert(&mut self, key: &Self::Key, value: &Self::Value);
    fn remove(&mut self, key: &Self::Key);
    fn clear(&mut self);
}

/// No caching: every load reaches the loader. The right choice when loads are
/// scoped to a single resolution pass.
pub struct NoCache;

impl CacheFactory for NoCache {
    fn create<K, V>(&self) -> Box<dyn CacheStorage<Key = K, Value = V>>
    where
        K: Send + Sync + Clone + Eq + Hash + 'static,
        V: Send + Sync + Clone + 'static,
    {
        Box::new(NoCacheStorage(PhantomData))
    }
}

struct NoCacheStorage<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> CacheStorage for NoCacheStorage<K, V>
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&mut self, _key: &K) -> Option<&V> {
        None
    }

    fn insert(&mut self, _key: &K, _value: &V) {}

    fn remove(&mut self, _key: &K) {}

    fn clear(&mut self) {}
}

/// Unbounded in-memory cache, keyed per loaded key.
pub struct HashMapCache;

impl CacheFactory for HashMapCache {
    fn create<K, V>(&self) -> Box<dyn CacheStorage<Key = K, Value = V>>
    where
        K: Send + Sync + Clone + Eq + Hash + 'static,
        V: Send + Sync + Clone + 'static,
    {
        Box::new(HashMapCacheStorage(HashMap::new()))
    }
}

struct HashMapCacheStorage<K, V>(HashMap<K, V>);

impl<K, V> CacheStorage for HashMapCacheStorage<K, V>
where
    K: Send + Sync + Clone + Eq + Hash + 'static,
    V: Send + Sync + Clone + 'static,
{
    type Key = K;
    type Value = V;

    fn get(&mut self, key: &K) -> Option<&V> {
        self.0.get(key)
    }

    fn insert(&mut self, key: &K, value: &V) {
        self.0.insert(key.clone(), value.clone());
    }

    fn remove(&mut self, key: &K) {
        self.0.remove(key);
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}
