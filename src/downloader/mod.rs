// Downloader module - resolution engine, backends and relay

pub mod backends;
pub mod catalog;
pub mod credentials;
pub mod diagnostics;
pub mod enricher;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod playlist;
pub mod relay;
pub mod stream;
pub mod traits;
pub mod utils;

pub use catalog::{BackendConfig, BackendFamily, CatalogBuilder, CatalogPolicy, StrategyCatalog};
pub use credentials::Credentials;
pub use errors::{AggregatedFailure, DownloadError, FailureKind};
pub use models::{Intent, MediaKind, NetworkConfig, PlaylistTarget, Target, VideoDetails};
pub use orchestrator::{EngineSettings, ResolutionEngine};
pub use relay::{relay, RelayError, RelayOutcome};
pub use stream::{ByteSource, ResolutionResult, StreamHandle};
pub use traits::DownloaderBackend;
