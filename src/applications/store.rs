//! Application Store
//!
//! Record store for submitted applications. Only simple predicates are
//! supported; anything relational belongs in the backing database.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::model::Application;

/// Error types for application storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An application with this ID already exists
    #[error("Application already exists: {0}")]
    Duplicate(String),

    /// No application with this ID
    #[error("Application not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationFilter {
    /// Only records whose completion webhook did (or did not) go out
    pub webhook_sent: Option<bool>,

    /// Maximum number of records, newest first
    pub limit: Option<usize>,
}

impl ApplicationFilter {
    fn matches(&self, application: &Application) -> bool {
        self.webhook_sent
            .map_or(true, |sent| application.webhook_sent == sent)
    }
}

/// Storage seam for applications
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Persist a new application
    async fn insert(&self, application: Application) -> Result<(), StoreError>;

    /// Fetch an application by ID
    async fn get(&self, id: &str) -> Result<Option<Application>, StoreError>;

    /// List applications matching `filter`, newest first
    async fn list(&self, filter: &ApplicationFilter) -> Result<Vec<Application>, StoreError>;

    /// Record the completion webhook result
    async fn mark_webhook_sent(&self, id: &str, sent: bool) -> Result<(), StoreError>;
}

/// In-memory application store
#[derive(Debug, Clone, Default)]
pub struct MemoryApplicationStore {
    records: Arc<RwLock<HashMap<String, Application>>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn insert(&self, application: Application) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&application.id) {
            return Err(StoreError::Duplicate(application.id));
        }
        records.insert(application.id.clone(), application);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Application>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn list(&self, filter: &ApplicationFilter) -> Result<Vec<Application>, StoreError> {
        let records = self.records.read().await;
        let mut matching: Vec<Application> = records
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        drop(records);

        matching.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    async fn mark_webhook_sent(&self, id: &str, sent: bool) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let application = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        application.webhook_sent = sent;
        application.updated_at = Utc::now();
        Ok(())
    }
}
