//! S3-compatible object store.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use kbase_core::stores::{ObjectDeletion, ObjectStore, StoreError, StoredObject};

use crate::{public_url, OBJECT_STORE};

/// `DeleteObjects` accepts at most this many keys per call.
const DELETE_BATCH: usize = 1000;

/// Bucket-backed [`ObjectStore`].
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket,
            public_base_url,
        }
    }

    /// Build a client from the ambient AWS configuration (env, profile,
    /// instance metadata). `AWS_ENDPOINT_URL` is honoured for S3-compatible
    /// services.
    pub async fn from_env(bucket: String, public_base_url: String) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);
        Self::new(client, bucket, public_base_url)
    }

    async fn delete_chunk(&self, keys: &[String]) -> Result<DeleteObjectsOutput, StoreError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::unavailable(OBJECT_STORE, e))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| StoreError::unavailable(OBJECT_STORE, e))?;

        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StoreError::unavailable(OBJECT_STORE, e))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StoreError::unavailable(OBJECT_STORE, e))?;

        Ok(StoredObject {
            path: path.to_string(),
            public_url: public_url(&self.public_base_url, path),
        })
    }

    async fn delete_many(&self, paths: &[String]) -> Result<ObjectDeletion, StoreError> {
        let mut tally = ObjectDeletion::default();
        let mut reached = false;
        let mut last_error = None;

        for chunk in paths.chunks(DELETE_BATCH) {
            match self.delete_chunk(chunk).await {
                Ok(resp) => {
                    reached = true;
                    for err in resp.errors() {
                        tracing::warn!(
                            key = err.key().unwrap_or_default(),
                            code = err.code().unwrap_or_default(),
                            "S3 refused to delete object",
                        );
                    }
                    tally.deleted += resp.deleted().len() as u64;
                    tally.failed += resp.errors().len() as u64;
                }
                Err(e) => {
                    tracing::warn!(keys = chunk.len(), error = %e, "S3 delete batch failed");
                    tally.failed += chunk.len() as u64;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !reached => Err(e),
            _ => Ok(tally),
        }
    }
}
