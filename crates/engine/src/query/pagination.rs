use runtime::DatastoreConfig;

use crate::response::Cursor;

/// Cursor window requested by the caller. The default value means "no
/// pagination requested yet" and merges as the identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentPagination {
    pub first: Option<u32>,
    pub after: Option<Cursor>,
    pub last: Option<u32>,
    pub before: Option<Cursor>,
}

impl DocumentPagination {
    pub fn first(count: u32) -> Self {
        Self {
            first: Some(count),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.after.is_none() && self.last.is_none() && self.before.is_none()
    }

    pub(crate) fn requested_page_size(&self, config: &DatastoreConfig) -> u32 {
        self.first
            .or(self.last)
            .unwrap_or(config.default_page_size)
    }
}
