//! In-memory subject.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::SubjectSnapshot;
use crate::domain::ports::Subject;

#[derive(Debug)]
struct Contents {
    revision: u64,
    artifacts: BTreeMap<String, String>,
}

/// Subject held in memory. Fix appliers write through [`put`](Self::put),
/// which bumps the revision seen by the next snapshot.
#[derive(Debug)]
pub struct InMemorySubject {
    reference: String,
    contents: RwLock<Contents>,
}

impl InMemorySubject {
    pub fn new(reference: impl Into<String>, artifacts: BTreeMap<String, String>) -> Self {
        Self {
            reference: reference.into(),
            contents: RwLock::new(Contents {
                revision: 1,
                artifacts,
            }),
        }
    }

    pub fn empty(reference: impl Into<String>) -> Self {
        Self::new(reference, BTreeMap::new())
    }

    /// Replace one artifact.
    pub async fn put(&self, name: impl Into<String>, content: impl Into<String>) {
        let mut contents = self.contents.write().await;
        contents.artifacts.insert(name.into(), content.into());
        contents.revision += 1;
    }

    pub async fn revision(&self) -> u64 {
        self.contents.read().await.revision
    }
}

#[async_trait]
impl Subject for InMemorySubject {
    fn reference(&self) -> String {
        self.reference.clone()
    }

    async fn snapshot(&self) -> DomainResult<SubjectSnapshot> {
        let contents = self.contents.read().await;
        Ok(SubjectSnapshot::new(
            self.reference.clone(),
            contents.revision,
            contents.artifacts.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_bumps_revision() {
        let subject = InMemorySubject::empty("doc");
        let before = subject.snapshot().await.unwrap();
        subject.put("README.md", "# hi").await;
        let after = subject.snapshot().await.unwrap();

        assert_eq!(before.revision + 1, after.revision);
        assert_eq!(before.artifact("README.md"), None);
        assert_eq!(after.artifact("README.md"), Some("# hi"));
    }
}
