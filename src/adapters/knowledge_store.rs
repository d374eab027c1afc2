//! In-memory knowledge store keyed by issue type.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::Issue;
use crate::domain::ports::KnowledgeStore;

/// Remembers the latest resolution per issue type and suggests it for new
/// issues of the same type.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    resolutions: RwLock<HashMap<String, String>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.resolutions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.resolutions.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn suggest_fix(&self, issue: &Issue) -> DomainResult<Option<String>> {
        Ok(self.resolutions.read().await.get(&issue.issue_type).cloned())
    }

    async fn record(&self, issue: &Issue, resolution: &str) -> DomainResult<()> {
        self.resolutions
            .write()
            .await
            .insert(issue.issue_type.clone(), resolution.to_string());
        Ok(())
    }
}
