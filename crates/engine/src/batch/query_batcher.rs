use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use dataloader::{DataLoader, Loader, NoCache};
use indexmap::IndexMap;

use runtime::{DatastoreClient, DatastoreConfig};

use crate::error::Error;
use crate::query::Query;
use crate::response::SearchResponse;

/// Keys a pending query by object identity: two structurally equal but
/// separately constructed queries stay separate batch entries. Callers
/// that want dedup share one `Arc`.
#[derive(Clone, Debug)]
pub struct QueryHandle(Arc<Query>);

impl QueryHandle {
    pub fn query(&self) -> &Query {
        &self.0
    }
}

impl PartialEq for QueryHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for QueryHandle {}

impl Hash for QueryHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

pub(crate) struct DatastoreLoader {
    client: Arc<dyn DatastoreClient>,
    config: Arc<DatastoreConfig>,
}

#[async_trait]
impl Loader<QueryHandle> for DatastoreLoader {
    // Per-sub-query isolation: one entry failing must not fail its
    // siblings, so the per-key value itself is a result.
    type Value = Result<Arc<SearchResponse>, Error>;
    type Error = Error;

    async fn load(
        &self,
        keys: &[QueryHandle],
    ) -> Result<HashMap<QueryHandle, Self::Value>, Error> {
        // One multi-search call per distinct cluster implicated by the
        // batch, keeping each call's request order stable.
        let mut by_cluster: IndexMap<String, Vec<QueryHandle>> = IndexMap::new();
        for key in keys {
            let cluster = self.config.cluster_for(key.query().index_set().names())?;
            by_cluster
                .entry(cluster.to_owned())
                .or_default()
                .push(key.clone());
        }

        let calls = by_cluster.into_iter().map(|(cluster, handles)| async move {
            let requests = handles
                .iter()
                .map(|handle| handle.query().to_search_request(&self.config))
                .collect::<Result<Vec<_>, _>>()?;
            let count = requests.len();
            let responses = self.client.execute_batch(&cluster, requests).await?;
            if responses.len() != count {
                return Err(Error::Internal(format!(
                    "datastore returned {} responses for {count} requests",
                    responses.len()
                )));
            }
            Ok::<_, Error>(handles.into_iter().zip(responses))
        });

        let mut results = HashMap::new();
        for pairs in futures_util::future::try_join_all(calls).await? {
            for (handle, result) in pairs {
                results.insert(
                    handle,
                    result
                        .map(|raw| Arc::new(SearchResponse::from_raw(raw)))
                        .map_err(Error::from),
                );
            }
        }
        Ok(results)
    }
}

/// Collects the queries issued during one resolution pass and executes
/// them as a single multi-search batch per cluster, handing each caller
/// its own response in request order.
pub struct QueryBatcher {
    loader: DataLoader<DatastoreLoader, NoCache>,
    config: Arc<DatastoreConfig>,
}

impl QueryBatcher {
    pub fn new(client: Arc<dyn DatastoreClient>, config: Arc<DatastoreConfig>) -> Self {
        let loader = DataLoader::new(
            DatastoreLoader {
                client,
                config: config.clone(),
            },
            tokio::spawn,
        );
        Self { loader, config }
    }

    pub fn config(&self) -> &Arc<DatastoreConfig> {
        &self.config
    }

    /// Suspends until the current batch flushes. Sibling resolvers calling
    /// this within the same pass share the datastore round trip.
    pub async fn load(&self, query: Arc<Query>) -> Result<Arc<SearchResponse>, Error> {
        match self.loader.load_one(QueryHandle(query)).await? {
            Some(result) => result,
            None => Err(Error::Internal(
                "batch flush dropped a pending query".to_owned(),
            )),
        }
    }
}
