//! Batch loading of keyed values with cooperative flushing.
//!
//! Many concurrent callers request individual keys through
//! [`DataLoader::load_one`]; the loader suspends them, accumulates the keys,
//! and resolves them all with a single [`Loader::load`] call per batch. The
//! flush is triggered either by a short delay after the first pending key or
//! by reaching `max_batch_size`.

mod cache;

pub use cache::{CacheFactory, CacheStorage, HashMapCache, NoCache};

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_channel::oneshot;
use futures_util::future::BoxFuture;

/// Resolves a batch of keys in one backend round trip.
///
/// Keys absent from the returned map are reported as missing to their
/// callers, not as errors.
#[async_trait::async_trait]
pub trait Loader<K>: Send + Sync + 'static
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
{
    type Value: Send + Sync + Clone + 'static;
    type Error: Send + Sync + Clone + 'static;

    async fn load(&self, keys: &[K]) -> Result<HashMap<K, Self::Value>, Self::Error>;
}

struct Pending<K, T>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    keys: HashSet<K>,
    use_cache_values: HashMap<K, T::Value>,
    tx: oneshot::Sender<Result<HashMap<K, T::Value>, T::Error>>,
}

struct Requests<K, T>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    keys: HashSet<K>,
    pending: Vec<Pending<K, T>>,
    cache_storage: Box<dyn CacheStorage<Key = K, Value = T::Value>>,
}

impl<K, T> Requests<K, T>
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    fn new<C: CacheFactory>(cache_factory: &C) -> Self {
        Self {
            keys: HashSet::new(),
            pending: Vec::new(),
            cache_storage: cache_factory.create::<K, T::Value>(),
        }
    }

    fn take_batch(&mut self) -> (HashSet<K>, Vec<Pending<K, T>>) {
        (mem::take(&mut self.keys), mem::take(&mut self.pending))
    }
}

struct Inner<T> {
    loader: T,
    // One Requests<K, T> per key type, keyed by TypeId.
    requests: Mutex<HashMap<TypeId, Box<dyn Any + Send>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn flush<K, T>(inner: &Inner<T>, keys: Vec<K>, pending: Vec<Pending<K, T>>)
where
    K: Send + Sync + Hash + Eq + Clone + 'static,
    T: Loader<K>,
{
    if pending.is_empty() {
        return;
    }
    match inner.loader.load(&keys).await {
        Ok(values) => {
            {
                let mut guard = lock(&inner.requests);
                if let Some(requests) = guard
                    .get_mut(&TypeId::of::<K>())
                    .and_then(|any| any.downcast_mut::<Requests<K, T>>())
                {
                    for (key, value) in &values {
                        requests.cache_storage.insert(key, value);
                    }
                }
            }
            for entry in pending {
                let mut result = entry.use_cache_values;
                for key in &entry.keys {
                    if let Some(value) = values.get(key) {
                        result.insert(key.clone(), value.clone());
                    }
                }
                let _ = entry.tx.send(Ok(result));
            }
        }
        Err(err) => {
            for entry in pending {
                let _ = entry.tx.send(Err(err.clone()));
            }
        }
    }
}

/// Coalesces concurrent keyed loads into batched [`Loader::load`] calls.
pub struct DataLoader<T, C = NoCache> {
    inner: Arc<Inner<T>>,
    cache_factory: C,
    spawner: Box<dyn Fn(BoxFuture<'static, ()>) + Send + Sync>,
    delay: Duration,
    max_batch_size: usize,
}

impl<T> DataLoader<T, NoCache>
where
    T: Send + Sync + 'static,
{
    pub fn new<S, R>(loader: T, spawner: S) -> Self
    where
        S: Fn(BoxFuture<'static, ()>) -> R + Send + Sync + 'static,
    {
        Self::with_cache(loader, spawner, NoCache)
    }
}

impl<T, C> DataLoader<T, C>
where
    T: Send + Sync + 'static,
    C: CacheFactory,
{
    pub fn with_cache<S, R>(loader: T, spawner: S, cache_factory: C) -> Self
    where
        S: Fn(BoxFuture<'static, ()>) -> R + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                loader,
                requests: Mutex::default(),
            }),
            cache_factory,
            spawner: Box::new(move |fut| {
                spawner(fut);
            }),
            delay: Duration::from_millis(1),
            max_batch_size: 1000,
        }
    }

    /// Time to keep accumulating keys after the first pending one.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Flush immediately once this many distinct keys are pending.
    #[must_use]
    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn loader(&self) -> &T {
        &self.inner.loader
    }

    pub async fn load_one<K>(&self, key: K) -> Result<Option<T::Value>, T::Error>
    where
        K: Send + Sync + Hash + Eq + Clone + 'static,
        T: Loader<K>,
    {
        let mut values = self.load_many(std::iter::once(key.clone())).await?;
        Ok(values.remove(&key))
    }

    pub async fn load_many<K, I>(&self, keys: I) -> Result<HashMap<K, T::Value>, T::Error>
    where
        K: Send + Sync + Hash + Eq + Clone + 'static,
        I: IntoIterator<Item = K>,
        T: Loader<K>,
    {
        enum Action<K, T>
        where
            K: Send + Sync + Hash + Eq + Clone + 'static,
            T: Loader<K>,
        {
            ImmediateLoad(HashSet<K>, Vec<Pending<K, T>>),
            ScheduleFlush,
            Wait,
        }

        let keys: HashSet<K> = keys.into_iter().collect();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let (tx, rx) = oneshot::channel();
        let action = {
            let mut guard = lock(&self.inner.requests);
            let requests = guard
                .entry(TypeId::of::<K>())
                .or_insert_with(|| Box::new(Requests::<K, T>::new(&self.cache_factory)));
            let Some(requests) = requests.downcast_mut::<Requests<K, T>>() else {
                // TypeId keying makes this unreachable.
                return Ok(HashMap::new());
            };

            let mut use_cache_values = HashMap::new();
            let mut missing = HashSet::new();
            for key in keys {
                if let Some(value) = requests.cache_storage.get(&key) {
                    use_cache_values.insert(key, value.clone());
                } else {
                    missing.insert(key);
                }
            }
            if missing.is_empty() {
                return Ok(use_cache_values);
            }

            requests.keys.extend(missing.iter().cloned());
            let first_pending = requests.pending.is_empty();
            requests.pending.push(Pending {
                keys: missing,
                use_cache_values,
                tx,
            });

            if requests.keys.len() >= self.max_batch_size {
                let (keys, pending) = requests.take_batch();
                Action::ImmediateLoad(keys, pending)
            } else if first_pending {
                Action::ScheduleFlush
            } else {
                Action::Wait
            }
        };

        match action {
            Action::ImmediateLoad(keys, pending) => {
                flush(&self.inner, keys.into_iter().collect(), pending).await;
            }
            Action::ScheduleFlush => {
                let inner = self.inner.clone();
                let delay = self.delay;
                (self.spawner)(Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    let batch = {
                        let mut guard = lock(&inner.requests);
                        guard
                            .get_mut(&TypeId::of::<K>())
                            .and_then(|any| any.downcast_mut::<Requests<K, T>>())
                            .map(Requests::take_batch)
                    };
                    if let Some((keys, pending)) = batch {
                        flush(&inner, keys.into_iter().collect(), pending).await;
                    }
                }));
            }
            Action::Wait => {}
        }

        match rx.await {
            Ok(result) => result,
            // The sender is only dropped if the flush task was cancelled.
            Err(_) => Ok(HashMap::new()),
        }
    }
}
