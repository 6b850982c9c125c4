use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Abstract contract for the blob store holding uploaded images. Handlers and the
/// cover photo manager only see this trait, so production runs on S3 (or any
/// S3-compatible gateway) while tests run on `MockStorageService`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in `Env::Local` to provision MinIO.
    async fn ensure_bucket_exists(&self);

    /// Stores `body` under `key`, replacing any object already there.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Removes the object at `key`. Removing a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// Public URL under which the object at `key` is served.
    fn public_url(&self, key: &str) -> String;
}

// 2. The Real Implementation (S3/MinIO)
/// S3StorageClient
///
/// Concrete implementation on the AWS SDK. `force_path_style(true)` keeps it
/// compatible with MinIO and other S3 gateways.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Builds the client from static credentials. No request is sent here.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // Path-style addressing (http://endpoint/bucket/key) is what MinIO expects.
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// Calls CreateBucket. Safe to repeat at every startup.
    async fn ensure_bucket_exists(&self) {
        // CreateBucket on an existing bucket only returns an error we can ignore.
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    /// put_object
    ///
    /// Uploads the image with its declared content type under the sanitised key.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// delete_object
    ///
    /// S3 answers 204 for missing keys too, so a repeated delete succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    /// public_url
    ///
    /// `{public_base_url}/{bucket}/{key}`, matching the path-style layout above.
    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base_url,
            self.bucket_name,
            sanitize_key(key)
        )
    }
}

/// sanitize_key
///
/// Strips empty, `.` and `..` segments so a key can never climb out of its namespace.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory blob store used by the test suites. Clones share the same objects,
/// so a test can keep a handle and inspect what the application stored.
#[derive(Clone, Default)]
pub struct MockStorageService {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    /// When true, every write returns a simulated failure.
    pub should_fail: bool,
    /// When true, only deletions fail.
    pub fail_deletes: bool,
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn new_failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(&sanitize_key(key))
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.lock().get(&sanitize_key(key)).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        // A panic while holding the lock only happens inside a failing test.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    /// put_object
    ///
    /// Records the object in memory unless `should_fail` is set.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        self.lock().insert(
            sanitize_key(key),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    /// delete_object
    ///
    /// Fails when either failure switch is set.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail || self.fail_deletes {
            return Err(StorageError::Backend(
                "Mock Storage Error: delete rejected".to_string(),
            ));
        }
        self.lock().remove(&sanitize_key(key));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }
}

/// StorageState
///
/// Shared handle to the storage backend held in the application state.
pub type StorageState = Arc<dyn StorageService>;
