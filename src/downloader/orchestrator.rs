// Orchestrator with fallback logic
//
// Strategy:
// 1. Walk the catalog in order, one attempt in flight at a time
// 2. First success wins; NotFound/Unsupported stop the walk
// 3. AuthRequired/RateLimited/Transient move on (RateLimited after a backoff)
// 4. Exhaustion reports an aggregated failure, AuthRequired taking priority

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::catalog::{BackendConfig, BackendFamily, StrategyCatalog};
use super::errors::{AggregatedFailure, AttemptFailure, DownloadError, FailureKind};
use super::models::{Intent, Target, VideoDetails};
use super::stream::ResolutionResult;
use super::traits::DownloaderBackend;

/// Timing knobs for the fallback walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound for one backend attempt; exceeding it counts as Transient
    pub attempt_timeout: Duration,
    /// Pause after a RateLimited failure before the next strategy
    pub rate_limit_backoff: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            rate_limit_backoff: Duration::from_millis(750),
        }
    }
}

/// Drives backend adapters over a strategy catalog
#[derive(Clone)]
pub struct ResolutionEngine {
    backends: HashMap<BackendFamily, Arc<dyn DownloaderBackend>>,
    settings: EngineSettings,
}

impl ResolutionEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            backends: HashMap::new(),
            settings,
        }
    }

    pub fn with_backend(mut self, family: BackendFamily, backend: Arc<dyn DownloaderBackend>) -> Self {
        self.backends.insert(family, backend);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Resolve media for the target: first usable result or an aggregated failure
    pub async fn resolve(
        &self,
        target: &Target,
        intent: &Intent,
        catalog: &StrategyCatalog,
    ) -> Result<ResolutionResult, AggregatedFailure> {
        self.run(catalog, "media", |_| true, |backend, config| {
            let target = target.clone();
            let intent = *intent;
            async move { backend.attempt(&target, &intent, &config).await }
        })
        .await
    }

    /// Resolve descriptive metadata. Families without a details capability are skipped.
    pub async fn resolve_details(
        &self,
        target: &Target,
        catalog: &StrategyCatalog,
    ) -> Result<VideoDetails, AggregatedFailure> {
        self.run(
            catalog,
            "details",
            |backend| backend.provides_details(),
            |backend, config| {
                let target = target.clone();
                async move { backend.fetch_details(&target, &config).await }
            },
        )
        .await
    }

    async fn run<T, F, Fut, P>(
        &self,
        catalog: &StrategyCatalog,
        operation: &'static str,
        eligible: P,
        invoke: F,
    ) -> Result<T, AggregatedFailure>
    where
        P: Fn(&dyn DownloaderBackend) -> bool,
        F: Fn(Arc<dyn DownloaderBackend>, BackendConfig) -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        let mut failures: Vec<AttemptFailure> = Vec::new();

        for (index, config) in catalog.iter().enumerate() {
            let strategy = config.label();

            let Some(backend) = self.backends.get(&config.family) else {
                warn!(strategy = %strategy, "No backend registered for family, skipping");
                continue;
            };
            if !eligible(backend.as_ref()) {
                debug!(strategy = %strategy, operation, "Backend does not provide this operation, skipping");
                continue;
            }

            info!(
                backend = backend.name(),
                strategy = %strategy,
                attempt = index + 1,
                operation,
                "Trying strategy"
            );

            let outcome = match tokio::time::timeout(
                self.settings.attempt_timeout,
                invoke(Arc::clone(backend), config.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(DownloadError::timeout(self.settings.attempt_timeout)),
            };

            let error = match outcome {
                Ok(value) => {
                    info!(strategy = %strategy, operation, "Strategy succeeded");
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.kind();
            warn!(strategy = %strategy, kind = %kind, operation, "Strategy failed: {}", error.message());
            failures.push(AttemptFailure {
                strategy,
                error,
            });

            if kind.is_terminal() {
                break;
            }
            if kind == FailureKind::RateLimited && !self.settings.rate_limit_backoff.is_zero() {
                debug!(backoff_ms = self.settings.rate_limit_backoff.as_millis() as u64, "Backing off after rate limit");
                tokio::time::sleep(self.settings.rate_limit_backoff).await;
            }
        }

        let failure = AggregatedFailure::from_attempts(failures);
        warn!(kind = %failure.kind, operation, "Resolution failed: {}", failure);
        Err(failure)
    }
}
