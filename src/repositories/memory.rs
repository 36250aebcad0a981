use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sonic_rs::JsonValueTrait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::repositories::store::Database;

/// In-process document store for single-node deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    documents: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl MemoryDatabase {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents of `kind`.
    pub async fn count(&self, kind: &str) -> usize {
        self.documents
            .read()
            .await
            .keys()
            .filter(|(k, _)| k == kind)
            .count()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get(&self, kind: &str, id: &str) -> Result<Option<String>> {
        let documents = self.documents.read().await;
        Ok(documents.get(&(kind.to_string(), id.to_string())).cloned())
    }

    async fn save(&self, kind: &str, id: &str, payload: String) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert((kind.to_string(), id.to_string()), payload);
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.remove(&(kind.to_string(), id.to_string()));
        Ok(())
    }

    async fn delete_expired(
        &self,
        kind: &str,
        field: &str,
        cutoff: i64,
        limit: Option<i64>,
    ) -> Result<u64> {
        let mut documents = self.documents.write().await;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        let expired: Vec<(String, String)> = documents
            .iter()
            .filter(|((k, _), _)| k == kind)
            .filter(|(_, payload)| {
                sonic_rs::from_str::<sonic_rs::Value>(payload)
                    .ok()
                    .and_then(|doc| doc.get(field).and_then(|v| v.as_i64()))
                    .is_some_and(|value| value <= cutoff)
            })
            .map(|(key, _)| key.clone())
            .take(limit)
            .collect();

        for key in &expired {
            documents.remove(key);
        }
        Ok(expired.len() as u64)
    }
}
