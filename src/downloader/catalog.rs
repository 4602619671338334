// Strategy catalog - ordered backend configurations for one request
//
// Ordering policy:
// 1. Credentialed strategies first, when a valid cookie blob is present
// 2. Within equal credential status, less detectable client identities first
// 3. Ties keep policy order
//
// The policy is plain data so deployments can reorder without touching the engine.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::credentials::Credentials;
use super::models::{Intent, MediaKind, NetworkConfig};

/// Upstream family a strategy is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    /// yt-dlp subprocess
    YtDlp,
    /// YouTube InnerTube player API over HTTP
    Innertube,
    /// Cobalt-compatible extraction API
    Cobalt,
}

impl BackendFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YtDlp => "yt-dlp",
            Self::Innertube => "innertube",
            Self::Cobalt => "cobalt",
        }
    }
}

/// Client identity presented to YouTube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerClient {
    Web,
    WebSafari,
    Tv,
    Ios,
    Android,
}

impl PlayerClient {
    /// Name understood by `--extractor-args youtube:player_client=`
    pub fn ytdlp_name(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::WebSafari => "web_safari",
            Self::Tv => "tv",
            Self::Ios => "ios",
            Self::Android => "android",
        }
    }

    /// Lower is more like ordinary browser traffic
    pub fn detectability(&self) -> u8 {
        match self {
            Self::Web => 0,
            Self::WebSafari => 1,
            Self::Tv => 2,
            Self::Ios => 3,
            Self::Android => 4,
        }
    }
}

/// How a resolved media URL reaches the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Bytes are fetched by this server and relayed
    #[default]
    Proxy,
    /// Caller is redirected to the upstream URL
    Redirect,
}

/// Everything needed to make one backend attempt
#[derive(Clone)]
pub struct BackendConfig {
    pub family: BackendFamily,
    pub client: PlayerClient,
    /// Present only for credentialed strategies
    pub credentials: Option<Arc<Credentials>>,
    /// API endpoint for families that need one (Cobalt)
    pub endpoint: Option<String>,
    pub delivery: Delivery,
    pub network: NetworkConfig,
}

impl BackendConfig {
    pub fn new(family: BackendFamily, client: PlayerClient) -> Self {
        Self {
            family,
            client,
            credentials: None,
            endpoint: None,
            delivery: Delivery::default(),
            network: NetworkConfig::default(),
        }
    }

    pub fn is_credentialed(&self) -> bool {
        self.credentials.is_some()
    }

    /// Stable label for logs and aggregated failures, e.g. `yt-dlp:web+cookies`
    pub fn label(&self) -> String {
        let identity = match self.family {
            BackendFamily::Cobalt => "api",
            _ => self.client.ytdlp_name(),
        };
        let suffix = if self.is_credentialed() { "+cookies" } else { "" };
        format!("{}:{}{}", self.family.as_str(), identity, suffix)
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("label", &self.label())
            .field("endpoint", &self.endpoint)
            .field("delivery", &self.delivery)
            .field("proxy", &self.network.proxy)
            .finish()
    }
}

/// One entry of the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyTemplate {
    pub family: BackendFamily,
    pub client: PlayerClient,
    pub credentialed: bool,
    pub delivery: Delivery,
    /// Whether the identity can serve a video-only stream
    pub video_only: bool,
}

impl StrategyTemplate {
    pub const fn anonymous(family: BackendFamily, client: PlayerClient) -> Self {
        Self {
            family,
            client,
            credentialed: false,
            delivery: Delivery::Proxy,
            video_only: true,
        }
    }

    pub const fn credentialed(family: BackendFamily, client: PlayerClient) -> Self {
        Self {
            family,
            client,
            credentialed: true,
            delivery: Delivery::Proxy,
            video_only: true,
        }
    }

    pub const fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub const fn without_video_only(mut self) -> Self {
        self.video_only = false;
        self
    }

    /// Third-party APIs rank after every first-party identity
    fn detectability(&self) -> u8 {
        match self.family {
            BackendFamily::Cobalt => u8::MAX,
            _ => self.client.detectability(),
        }
    }

    fn supports(&self, intent: &Intent) -> bool {
        intent.kind != MediaKind::VideoOnly || self.video_only
    }
}

/// Ordered list of templates the catalog is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPolicy {
    templates: Vec<StrategyTemplate>,
}

impl CatalogPolicy {
    pub fn new(templates: Vec<StrategyTemplate>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[StrategyTemplate] {
        &self.templates
    }
}

impl Default for CatalogPolicy {
    fn default() -> Self {
        use BackendFamily::*;
        use PlayerClient::*;

        Self::new(vec![
            StrategyTemplate::credentialed(YtDlp, Web),
            StrategyTemplate::credentialed(Innertube, Tv),
            StrategyTemplate::credentialed(YtDlp, Tv),
            StrategyTemplate::anonymous(YtDlp, WebSafari),
            StrategyTemplate::anonymous(Innertube, Ios),
            StrategyTemplate::anonymous(YtDlp, Ios),
            // The embedded TV player only serves muxed progressive formats anonymously
            StrategyTemplate::anonymous(YtDlp, Tv).without_video_only(),
            StrategyTemplate::anonymous(Innertube, Android),
            StrategyTemplate::anonymous(Cobalt, Web).with_delivery(Delivery::Redirect),
        ])
    }
}

/// Deployment-level inputs shared by every catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogSettings {
    pub cobalt_endpoint: Option<String>,
    pub proxy: Option<String>,
    pub socket_timeout: Option<Duration>,
}

/// Ordered strategies for one request. Built fresh per request.
#[derive(Debug, Clone)]
pub struct StrategyCatalog {
    entries: Vec<BackendConfig>,
}

impl StrategyCatalog {
    pub fn from_configs(entries: Vec<BackendConfig>) -> Self {
        Self { entries }
    }

    /// Build the catalog for a request.
    ///
    /// Deterministic for a given (credentials present, intent) pair. Always contains
    /// at least one uncredentialed entry.
    pub fn build(
        policy: &CatalogPolicy,
        credentials: Option<&Arc<Credentials>>,
        intent: &Intent,
        settings: &CatalogSettings,
    ) -> Self {
        let mut selected: Vec<(usize, &StrategyTemplate)> = policy
            .templates()
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.credentialed || credentials.is_some())
            .filter(|(_, t)| t.family != BackendFamily::Cobalt || settings.cobalt_endpoint.is_some())
            .filter(|(_, t)| t.supports(intent))
            .collect();

        selected.sort_by_key(|(index, t)| (!t.credentialed, t.detectability(), *index));

        let mut entries: Vec<BackendConfig> = selected
            .into_iter()
            .map(|(_, t)| Self::instantiate(t, credentials, settings))
            .collect();

        if !entries.iter().any(|c| !c.is_credentialed()) {
            let fallback = StrategyTemplate::anonymous(BackendFamily::YtDlp, PlayerClient::Web);
            entries.push(Self::instantiate(&fallback, None, settings));
        }

        Self { entries }
    }

    fn instantiate(
        template: &StrategyTemplate,
        credentials: Option<&Arc<Credentials>>,
        settings: &CatalogSettings,
    ) -> BackendConfig {
        let mut config = BackendConfig::new(template.family, template.client);
        config.delivery = template.delivery;
        config.network.proxy = settings.proxy.clone();
        if let Some(timeout) = settings.socket_timeout {
            config.network.timeout = timeout.as_secs().max(1) as u32;
        }
        if template.credentialed {
            config.credentials = credentials.cloned();
        }
        if template.family == BackendFamily::Cobalt {
            config.endpoint = settings.cobalt_endpoint.clone();
        }
        config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendConfig> {
        self.entries.iter()
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(BackendConfig::label).collect()
    }
}

/// Builds catalogs from the process-wide policy and read-only credentials
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    policy: CatalogPolicy,
    credentials: Option<Arc<Credentials>>,
    settings: CatalogSettings,
}

impl CatalogBuilder {
    pub fn new(
        policy: CatalogPolicy,
        credentials: Option<Arc<Credentials>>,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            policy,
            credentials,
            settings,
        }
    }

    pub fn build(&self, intent: &Intent) -> StrategyCatalog {
        StrategyCatalog::build(&self.policy, self.credentials.as_ref(), intent, &self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Arc<Credentials> {
        Arc::new(
            Credentials::from_json(r#"[{"name": "SID", "value": "1", "domain": ".youtube.com"}]"#)
                .unwrap(),
        )
    }

    fn settings_with_cobalt() -> CatalogSettings {
        CatalogSettings {
            cobalt_endpoint: Some("https://cobalt.example/".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_credentialed_strategies_come_first() {
        let creds = credentials();
        let catalog = StrategyCatalog::build(
            &CatalogPolicy::default(),
            Some(&creds),
            &Intent::default(),
            &CatalogSettings::default(),
        );

        let flags: Vec<bool> = catalog.iter().map(BackendConfig::is_credentialed).collect();
        let first_anonymous = flags.iter().position(|c| !c).unwrap();
        assert!(first_anonymous > 0);
        assert!(flags[first_anonymous..].iter().all(|c| !c));
    }

    #[test]
    fn test_without_credentials_only_anonymous() {
        let catalog = StrategyCatalog::build(
            &CatalogPolicy::default(),
            None,
            &Intent::default(),
            &CatalogSettings::default(),
        );

        assert!(!catalog.is_empty());
        assert!(catalog.iter().all(|c| !c.is_credentialed() && c.credentials.is_none()));
    }

    #[test]
    fn test_less_detectable_identities_first() {
        let catalog = StrategyCatalog::build(
            &CatalogPolicy::default(),
            None,
            &Intent::default(),
            &settings_with_cobalt(),
        );

        let ranks: Vec<u8> = catalog
            .iter()
            .map(|c| match c.family {
                BackendFamily::Cobalt => u8::MAX,
                _ => c.client.detectability(),
            })
            .collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
        assert_eq!(catalog.iter().last().unwrap().family, BackendFamily::Cobalt);
    }

    #[test]
    fn test_build_is_deterministic() {
        let creds = credentials();
        let intent = Intent::new(MediaKind::AudioOnly);
        let first = StrategyCatalog::build(
            &CatalogPolicy::default(),
            Some(&creds),
            &intent,
            &settings_with_cobalt(),
        );
        let second = StrategyCatalog::build(
            &CatalogPolicy::default(),
            Some(&creds),
            &intent,
            &settings_with_cobalt(),
        );
        assert_eq!(first.labels(), second.labels());
    }

    #[test]
    fn test_cobalt_requires_endpoint() {
        let without = StrategyCatalog::build(
            &CatalogPolicy::default(),
            None,
            &Intent::default(),
            &CatalogSettings::default(),
        );
        assert!(without.iter().all(|c| c.family != BackendFamily::Cobalt));

        let with = StrategyCatalog::build(
            &CatalogPolicy::default(),
            None,
            &Intent::default(),
            &settings_with_cobalt(),
        );
        let cobalt = with.iter().find(|c| c.family == BackendFamily::Cobalt).unwrap();
        assert_eq!(cobalt.endpoint.as_deref(), Some("https://cobalt.example/"));
        assert_eq!(cobalt.delivery, Delivery::Redirect);
    }

    #[test]
    fn test_video_only_skips_muxed_identities() {
        let full = StrategyCatalog::build(
            &CatalogPolicy::default(),
            None,
            &Intent::default(),
            &CatalogSettings::default(),
        );
        let silent = StrategyCatalog::build(
            &CatalogPolicy::default(),
            None,
            &Intent::new(MediaKind::VideoOnly),
            &CatalogSettings::default(),
        );
        assert!(full.labels().contains(&"yt-dlp:tv".to_string()));
        assert!(!silent.labels().contains(&"yt-dlp:tv".to_string()));
    }

    #[test]
    fn test_credential_only_policy_gets_anonymous_fallback() {
        let policy = CatalogPolicy::new(vec![StrategyTemplate::credentialed(
            BackendFamily::Innertube,
            PlayerClient::Tv,
        )]);

        let catalog =
            StrategyCatalog::build(&policy, None, &Intent::default(), &CatalogSettings::default());
        assert_eq!(catalog.labels(), vec!["yt-dlp:web".to_string()]);

        let creds = credentials();
        let catalog = StrategyCatalog::build(
            &policy,
            Some(&creds),
            &Intent::default(),
            &CatalogSettings::default(),
        );
        assert_eq!(
            catalog.labels(),
            vec!["innertube:tv+cookies".to_string(), "yt-dlp:web".to_string()]
        );
    }

    #[test]
    fn test_settings_flow_into_configs() {
        let settings = CatalogSettings {
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            socket_timeout: Some(Duration::from_secs(12)),
            ..Default::default()
        };
        let catalog =
            StrategyCatalog::build(&CatalogPolicy::default(), None, &Intent::default(), &settings);
        for config in catalog.iter() {
            assert_eq!(config.network.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
            assert_eq!(config.network.timeout, 12);
        }
    }
}
