use crate::StorageResult;
use async_trait::async_trait;

/// Object storage for attachment bytes, keyed by path.
///
/// Deletion is bulk and best-effort by contract: callers receive the paths
/// that failed together with the backend message, and decide whether the
/// failure is fatal. For attachment purges it never is; the metadata row is
/// the source of truth for listings.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a path. Fails with `Conflict` if the path exists.
    async fn put_object(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> StorageResult<()>;

    async fn get_object(&self, path: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete many objects, returning `(path, error)` for each failure.
    /// A missing object is not a failure.
    async fn delete_objects(&self, paths: &[String]) -> StorageResult<Vec<(String, String)>>;

    async fn list_paths(&self) -> StorageResult<Vec<String>>;
}
