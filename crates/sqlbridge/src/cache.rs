//! Query field metadata cache.
//!
//! Describing a query's result layout costs a round trip, so sessions keep
//! the mapped [`RowSchema`] keyed by connection name and SQL text. DDL run
//! through a session drops the entries of its connection.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::core::schema::RowSchema;

/// Cache of result layouts keyed by (connection name, SQL text).
pub trait FieldMetadataCache: Send + Sync {
    fn get(&self, connection: &str, sql: &str) -> Option<RowSchema>;

    fn put(&self, connection: &str, sql: &str, fields: RowSchema);

    /// Forget every entry of `connection`.
    fn clear_connection(&self, connection: &str);

    fn clear(&self);
}

/// Process-local [`FieldMetadataCache`].
#[derive(Debug, Default)]
pub struct InMemoryFieldCache {
    entries: RwLock<HashMap<(String, String), RowSchema>>,
}

impl InMemoryFieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FieldMetadataCache for InMemoryFieldCache {
    fn get(&self, connection: &str, sql: &str) -> Option<RowSchema> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(connection.to_string(), sql.to_string()))
            .cloned()
    }

    fn put(&self, connection: &str, sql: &str, fields: RowSchema) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((connection.to_string(), sql.to_string()), fields);
    }

    fn clear_connection(&self, connection: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(conn, _), _| conn != connection);
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{ColumnMeta, ValueType};

    fn schema() -> RowSchema {
        vec![ColumnMeta::new("id", ValueType::Integer)].into()
    }

    #[test]
    fn test_put_get_and_clear_connection() {
        let cache = InMemoryFieldCache::new();
        cache.put("dw", "SELECT * FROM a", schema());
        cache.put("dw", "SELECT * FROM b", schema());
        cache.put("crm", "SELECT * FROM a", schema());

        assert_eq!(cache.get("dw", "SELECT * FROM a"), Some(schema()));
        assert!(cache.get("dw", "SELECT * FROM c").is_none());

        cache.clear_connection("dw");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("crm", "SELECT * FROM a").is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
