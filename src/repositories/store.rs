//! Persistent object store.
//!
//! Models are stored as JSON documents addressed by `(kind, id)`. The
//! [`Database`] trait is the backend seam; [`ModelStore`] adds typed access.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BrokerError, Result};

/// A type persisted by the object store.
pub trait Model: Serialize + DeserializeOwned + Send + Sync {
    /// Kind name the documents are filed under.
    const KIND: &'static str;

    /// Unique id within `KIND`.
    fn id(&self) -> &str;
}

/// Raw document storage backend.
#[async_trait]
pub trait Database: Send + Sync {
    /// Returns the JSON document for `(kind, id)`, if any.
    async fn get(&self, kind: &str, id: &str) -> Result<Option<String>>;

    /// Inserts or replaces the document for `(kind, id)`.
    async fn save(&self, kind: &str, id: &str, payload: String) -> Result<()>;

    /// Removes the document for `(kind, id)`. Absent documents are not an error.
    async fn delete(&self, kind: &str, id: &str) -> Result<()>;

    /// Removes up to `limit` documents of `kind` whose integer `field` is at or below `cutoff`.
    ///
    /// Returns the number of removed documents.
    async fn delete_expired(
        &self,
        kind: &str,
        field: &str,
        cutoff: i64,
        limit: Option<i64>,
    ) -> Result<u64>;
}

/// Typed facade over a [`Database`] backend.
#[derive(Clone)]
pub struct ModelStore {
    db: Arc<dyn Database>,
}

impl ModelStore {
    /// Creates a store over `db`.
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Loads the model with `id`, failing with `NotFound` if absent.
    pub async fn get<M: Model>(&self, id: &str) -> Result<M> {
        let payload = self
            .db
            .get(M::KIND, id)
            .await?
            .ok_or_else(|| BrokerError::NotFound(format!("{} {} not found", M::KIND, id)))?;
        Ok(sonic_rs::from_str(&payload)?)
    }

    /// Saves `model`, replacing any previous version.
    pub async fn save<M: Model>(&self, model: &M) -> Result<()> {
        let payload = sonic_rs::to_string(model)?;
        self.db.save(M::KIND, model.id(), payload).await
    }

    /// Deletes `model`.
    pub async fn delete<M: Model>(&self, model: &M) -> Result<()> {
        self.db.delete(M::KIND, model.id()).await
    }

    /// Deletes models of type `M` whose `field` (epoch ms) is at or before `cutoff`.
    pub async fn delete_expired<M: Model>(
        &self,
        field: &str,
        cutoff: i64,
        limit: Option<i64>,
    ) -> Result<u64> {
        self.db.delete_expired(M::KIND, field, cutoff, limit).await
    }
}
