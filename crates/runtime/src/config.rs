use serde::Deserialize;

use crate::DatastoreError;

/// One searchable index and the limits the backend enforces on it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDefinition {
    pub name: String,
    #[serde(default = "default_cluster")]
    pub cluster: String,
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u32,
}

fn default_cluster() -> String {
    "main".to_owned()
}

fn default_max_result_window() -> u32 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatastoreConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    #[serde(default)]
    pub indices: Vec<IndexDefinition>,
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    500
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            indices: Vec::new(),
        }
    }
}

impl DatastoreConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, DatastoreError> {
        toml::from_str(content).map_err(|err| DatastoreError::Decode(err.to_string()))
    }

    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indices.iter().find(|index| index.name == name)
    }

    /// The cluster a set of index names is served from.
    ///
    /// Index sets are defined per logical type and always live on one
    /// cluster; the first configured index decides.
    pub fn cluster_for<'a>(
        &self,
        index_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<&str, DatastoreError> {
        let mut names = index_names.into_iter();
        let first = names
            .next()
            .ok_or_else(|| DatastoreError::UnknownIndex(String::new()))?;
        self.index(first)
            .map(|index| index.cluster.as_str())
            .ok_or_else(|| DatastoreError::UnknownIndex(first.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_omitted_fields() {
        let config = DatastoreConfig::from_toml_str(
            r#"
            [[indices]]
            name = "widgets"

            [[indices]]
            name = "parts"
            cluster = "secondary"
            max_result_window = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.max_page_size, 500);
        assert_eq!(config.index("widgets").unwrap().cluster, "main");
        assert_eq!(config.index("widgets").unwrap().max_result_window, 10_000);
        assert_eq!(config.index("parts").unwrap().cluster, "secondary");
        assert_eq!(config.cluster_for(["parts"]).unwrap(), "secondary");
        assert!(matches!(
            config.cluster_for(["unknown"]),
            Err(DatastoreError::UnknownIndex(_))
        ));
    }
}
