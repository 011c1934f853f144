//! Filesystem object store for single-node deployments.
//!
//! Files are written under a root directory and served by the API at the
//! configured public base URL.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use kbase_core::stores::{ObjectDeletion, ObjectStore, StoreError, StoredObject};

use crate::{public_url, OBJECT_STORE};

/// Directory-backed [`ObjectStore`].
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Resolve a store-relative path, refusing anything that could escape
    /// the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidResponse {
                store: OBJECT_STORE,
                message: format!("refusing object path '{path}'"),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::unavailable(OBJECT_STORE, e))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| StoreError::unavailable(OBJECT_STORE, e))?;

        Ok(StoredObject {
            path: path.to_string(),
            public_url: public_url(&self.public_base_url, path),
        })
    }

    async fn delete_many(&self, paths: &[String]) -> Result<ObjectDeletion, StoreError> {
        let mut tally = ObjectDeletion::default();
        for path in paths {
            let target = match self.resolve(path) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Skipping unsafe object path");
                    tally.failed += 1;
                    continue;
                }
            };
            match tokio::fs::remove_file(&target).await {
                Ok(()) => tally.deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %path, "Object already absent");
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Failed to delete object");
                    tally.failed += 1;
                }
            }
        }
        Ok(tally)
    }
}
