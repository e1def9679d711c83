use async_trait::async_trait;
use std::path::Path;
use crate::application::errors::DownloadError;

/// Fetches every image of a comic into a directory
///
/// Implementations may leave a partial set of files behind when the call is
/// cancelled; callers treat whatever is on disk as usable.
#[async_trait]
pub trait ComicDownloader: Send + Sync {
    async fn download(&self, comic_id: &str, target_dir: &Path) -> Result<(), DownloadError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
