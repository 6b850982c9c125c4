use url::form_urlencoded;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Article,
    repository::Repository,
    storage::StorageService,
};

/// Namespace (key prefix) cover images are stored under.
pub const COVERS_NAMESPACE: &str = "covers";

const AVATAR_SERVICE: &str = "https://ui-avatars.com/api/";
const AVATAR_COLOR: &str = "7F9CF5";
const AVATAR_BACKGROUND: &str = "EBF4FF";

/// CoverUpload
///
/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct CoverUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl CoverUpload {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Extension taken from the original file name, else from the content type.
    fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| std::path::Path::new(name).extension())
            .and_then(std::ffi::OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .or_else(|| {
                self.content_type
                    .strip_prefix("image/")
                    .map(|subtype| subtype.split(['+', ';']).next().unwrap_or(subtype).to_string())
            })
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "bin".to_string())
    }
}

/// cover_key
///
/// Randomised storage key for a new cover, e.g. `covers/<uuid>.jpg`.
pub fn cover_key(upload: &CoverUpload) -> String {
    format!(
        "{COVERS_NAMESPACE}/{}.{}",
        Uuid::new_v4().simple(),
        upload.extension()
    )
}

/// CoverPhotoManager
///
/// Stores, swaps and removes article cover images on the storage backend and
/// keeps the article's `cover_path` in step with what is stored.
pub struct CoverPhotoManager<'a> {
    repo: &'a dyn Repository,
    storage: &'a dyn StorageService,
}

impl<'a> CoverPhotoManager<'a> {
    pub fn new(repo: &'a dyn Repository, storage: &'a dyn StorageService) -> Self {
        Self { repo, storage }
    }

    /// update
    ///
    /// Stores `upload` under a fresh key, points the article at it and only then
    /// removes the previous cover. If the reference cannot be written the new blob
    /// is removed again, so either both the blob and the reference exist or neither.
    /// Returns the new key.
    pub async fn update(&self, article: &Article, upload: CoverUpload) -> Result<String, AppError> {
        let key = cover_key(&upload);
        self.storage
            .put_object(&key, upload.bytes, &upload.content_type)
            .await?;

        let swapped = match self.repo.set_cover_path(article.id, Some(&key)).await {
            Ok(swapped) => swapped,
            Err(e) => {
                self.discard(&key).await;
                return Err(e.into());
            }
        };
        if !swapped {
            self.discard(&key).await;
            return Err(AppError::NotFound(crate::error::ARTICLE_NOT_FOUND));
        }

        if let Some(previous) = article.cover_path.as_deref() {
            // The new cover is already referenced; a stale blob is only logged.
            if let Err(e) = self.storage.delete_object(previous).await {
                tracing::warn!(article_id = %article.id, key = previous, error = %e, "failed to delete superseded cover");
            }
        }

        tracing::info!(article_id = %article.id, key = %key, "cover photo updated");
        Ok(key)
    }

    /// delete
    ///
    /// Removes the stored cover and clears the reference. No-op without a cover.
    pub async fn delete(&self, article: &Article) -> Result<(), AppError> {
        let Some(path) = article.cover_path.as_deref() else {
            return Ok(());
        };
        self.storage.delete_object(path).await?;
        self.repo.set_cover_path(article.id, None).await?;
        tracing::info!(article_id = %article.id, key = path, "cover photo deleted");
        Ok(())
    }

    /// Best-effort removal of a blob that never became referenced.
    async fn discard(&self, key: &str) {
        if let Err(e) = self.storage.delete_object(key).await {
            tracing::error!(key, error = %e, "failed to discard unreferenced cover");
        }
    }
}

/// cover_url
///
/// Public URL of the article's cover, or the owner's avatar placeholder when none
/// was uploaded.
pub fn cover_url(storage: &dyn StorageService, article: &Article) -> String {
    match article.cover_path.as_deref() {
        Some(path) => storage.public_url(path),
        None => placeholder_url(&article.author),
    }
}

/// initials
///
/// First character of every space-separated segment, joined by spaces.
pub fn initials(name: &str) -> String {
    name.split(' ')
        .map(|segment| segment.chars().next().map(String::from).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// placeholder_url
///
/// Avatar-service URL rendering the initials of `name` with the fixed palette.
pub fn placeholder_url(name: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(initials(name).as_bytes()).collect();
    format!("{AVATAR_SERVICE}?name={encoded}&color={AVATAR_COLOR}&background={AVATAR_BACKGROUND}")
}
