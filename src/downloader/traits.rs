// Downloader backend trait definition

use async_trait::async_trait;

use super::catalog::BackendConfig;
use super::errors::DownloadError;
use super::models::{Intent, Target, VideoDetails};
use super::stream::ResolutionResult;

/// One upstream extraction capability.
///
/// The `BackendConfig` passed in fully determines client identity, credentials and
/// proxy. Implementations make one upstream attempt per call: no internal retries
/// and no silent switch to other credentials. Every failure is returned classified.
#[async_trait]
pub trait DownloaderBackend: Send + Sync {
    /// Name of the backend family (for logging)
    fn name(&self) -> &'static str;

    /// Whether `fetch_details` is implemented by this family
    fn provides_details(&self) -> bool {
        true
    }

    /// Resolve the target into something the relay can deliver
    async fn attempt(
        &self,
        target: &Target,
        intent: &Intent,
        config: &BackendConfig,
    ) -> Result<ResolutionResult, DownloadError>;

    /// Fetch descriptive metadata for the target
    async fn fetch_details(
        &self,
        target: &Target,
        config: &BackendConfig,
    ) -> Result<VideoDetails, DownloadError>;
}
