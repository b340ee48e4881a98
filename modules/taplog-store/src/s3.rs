//! S3 backend for the `ObjectStore` trait.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectCannedAcl, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use crate::{ObjectStore, Result, StoreError};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a store against the given bucket, with credentials from the
    /// environment (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY or IAM role).
    pub async fn new(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
            bucket: bucket.into(),
        }
    }

    /// Create with a custom endpoint, for S3-compatible services like MinIO.
    pub async fn with_endpoint(bucket: impl Into<String>, endpoint: &str) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(s3_config),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    StoreError::NotFound(key.to_string())
                } else {
                    StoreError::Backend(service_err.to_string())
                }
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(data.into_bytes())
    }

    async fn put(&self, key: &str, body: Bytes) -> Result<()> {
        debug!(key, bytes = body.len(), "put object");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::Private)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, from))
            .key(to)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let objects = keys
            .iter()
            .map(|k| {
                ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str, start_after: &str, max_keys: usize) -> Result<Vec<String>> {
        let mut req = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys as i32);
        if !start_after.is_empty() {
            req = req.start_after(start_after);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(resp
            .contents()
            .iter()
            .filter_map(|o| o.key().map(String::from))
            .collect())
    }
}
