/**
Fetch context for datafetch

Owns the registry, realtime bus, shared server cache and transports for
one process role. Contexts are built explicitly and passed to whatever
needs them; a single process-wide slot is available for hosts that want
one shared instance.
*/
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::fetch::{
    DataSource, DynFetcher, Endpoints, FallbackProvider, FetchOutcome, Fetcher, FetcherOptions,
    HttpClient, NoFallback, RecordParser, Registry, ReqwestHttpClient, ServerCache, Side,
};
use crate::realtime::RealtimeBus;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Global context instance
static CONTEXT: OnceLock<Arc<FetchContext>> = OnceLock::new();

/// Everything a fetcher needs from its context, cheap to clone
#[derive(Clone)]
pub struct FetchEnv {
    pub side: Side,
    pub config: Arc<FetchConfig>,
    pub endpoints: Arc<Endpoints>,
    pub bus: Arc<RealtimeBus>,
    pub server_cache: Arc<ServerCache>,
    pub http: Arc<dyn HttpClient>,
    pub fallback: Arc<dyn FallbackProvider>,
}

impl std::fmt::Debug for FetchEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEnv")
            .field("side", &self.side)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct FetchContext {
    env: FetchEnv,
    registry: Registry,
}

pub struct FetchContextBuilder {
    side: Side,
    config: FetchConfig,
    http: Option<Arc<dyn HttpClient>>,
    fallback: Option<Arc<dyn FallbackProvider>>,
}

impl FetchContextBuilder {
    #[must_use]
    pub fn config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: Arc<dyn FallbackProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<FetchContext> {
        let endpoints = Arc::new(Endpoints::new(
            &self.config.base_url,
            &self.config.api_base_path,
        ));
        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new(Some(Arc::clone(&endpoints)))));

        let env = FetchEnv {
            side: self.side,
            config: Arc::new(self.config),
            endpoints: Arc::clone(&endpoints),
            bus: RealtimeBus::new(self.side),
            server_cache: Arc::new(ServerCache::new()),
            http,
            fallback: self.fallback.unwrap_or_else(|| Arc::new(NoFallback)),
        };

        info!("Fetch context ready ({:?}, base {})", env.side, endpoints.base_url());
        Arc::new(FetchContext {
            registry: Registry::new(endpoints),
            env,
        })
    }
}

impl FetchContext {
    #[must_use]
    pub fn builder(side: Side) -> FetchContextBuilder {
        FetchContextBuilder {
            side,
            config: FetchConfig::default(),
            http: None,
            fallback: None,
        }
    }

    /// Context configured from `DATAFETCH_*` environment variables.
    #[must_use]
    pub fn from_env(side: Side) -> Arc<Self> {
        Self::builder(side).config(FetchConfig::from_env()).build()
    }

    #[must_use]
    pub const fn side(&self) -> Side {
        self.env.side
    }

    #[must_use]
    pub const fn env(&self) -> &FetchEnv {
        &self.env
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.env.config
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub const fn bus(&self) -> &Arc<RealtimeBus> {
        &self.env.bus
    }

    #[must_use]
    pub const fn server_cache(&self) -> &Arc<ServerCache> {
        &self.env.server_cache
    }

    /// Builds a fetcher bound to this context without registering it.
    #[must_use]
    pub fn create_fetcher<P: RecordParser>(&self, options: FetcherOptions, parser: P) -> Arc<Fetcher<P>> {
        Fetcher::new(&self.env, options, parser)
    }

    /// Builds and registers a fetcher under its own component id.
    pub fn register<P: RecordParser>(&self, options: FetcherOptions, parser: P) -> Arc<Fetcher<P>> {
        let fetcher = self.create_fetcher(options, parser);
        self.registry.register_fetcher(Arc::clone(&fetcher));
        fetcher
    }

    /// Looks up the registered fetcher and fetches through it.
    ///
    /// # Errors
    ///
    /// `FetcherNotFound` when nothing is registered for `component_id`;
    /// otherwise whatever the fetcher's data source surfaces.
    pub async fn fetch(&self, component_id: &str, side: Side) -> Result<FetchOutcome<Value>> {
        let fetcher = self.registry.require_fetcher(component_id)?;
        fetcher.fetch_values(side, None).await
    }

    /// Parses the data endpoint's `dataSource` query value, defaulting to json.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for values outside `json|csv|txt|api`.
    pub fn data_source_param(value: Option<&str>) -> Result<DataSource> {
        value.map_or(Ok(DataSource::Json), str::parse)
    }

    pub fn get_fetcher(&self, component_id: &str) -> Option<Arc<dyn DynFetcher>> {
        self.registry.get_fetcher(component_id)
    }

    /// Disposes every fetcher, drops bus listeners and push clients, and
    /// empties the server cache.
    pub fn shutdown(&self) {
        self.registry.clear();
        self.env.bus.clear();
        self.env.server_cache.clear();
        info!("Fetch context shut down");
    }
}

/// Install `context` as the process-wide instance
///
/// # Errors
///
/// Returns an error if a global context was already installed or created
pub fn initialize_global(context: Arc<FetchContext>) -> Result<()> {
    CONTEXT.set(context).map_err(|_| {
        warn!("Global fetch context already initialized");
        Error::Custom("global fetch context already initialized".to_string())
    })
}

/// Get the global context, if one was installed
#[must_use]
pub fn global() -> Option<Arc<FetchContext>> {
    CONTEXT.get().cloned()
}

/// Get the global context, creating a server-side one from the environment on first access
#[must_use]
pub fn instance() -> Arc<FetchContext> {
    Arc::clone(CONTEXT.get_or_init(|| FetchContext::from_env(Side::Server)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ValueParser;
    use crate::realtime::ChangeAction;

    #[test]
    fn test_data_source_param_defaults_to_json() {
        assert_eq!(FetchContext::data_source_param(None).unwrap(), DataSource::Json);
        assert_eq!(FetchContext::data_source_param(Some("txt")).unwrap(), DataSource::Txt);
        assert!(FetchContext::data_source_param(Some("xml")).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_replacing_fetcher_disposes_previous() {
        let ctx = FetchContext::builder(Side::Server).build();
        let first = ctx.register(FetcherOptions::new("UserData", DataSource::Json), ValueParser);
        assert_eq!(ctx.bus().subscribers_for("UserData"), 1);

        let second = ctx.register(FetcherOptions::new("UserData", DataSource::Csv), ValueParser);
        assert!(first.is_disposed());
        assert!(!second.is_disposed());
        assert_eq!(ctx.bus().subscribers_for("UserData"), 1);
        assert_eq!(
            ctx.registry().get_fetcher("UserData").map(|f| f.data_source()),
            Some(DataSource::Csv)
        );

        second.publish_data_change(ChangeAction::Refresh, None, None);
        ctx.shutdown();
        assert!(second.is_disposed());
        assert!(ctx.registry().is_empty());
        assert_eq!(ctx.bus().subscriber_count(), 0);
    }

    #[test]
    fn test_global_slot_is_set_once() {
        let ctx = FetchContext::builder(Side::Server).build();
        initialize_global(Arc::clone(&ctx)).unwrap();
        assert!(Arc::ptr_eq(&global().unwrap(), &ctx));
        assert!(Arc::ptr_eq(&instance(), &ctx));

        let err = initialize_global(FetchContext::builder(Side::Client).build()).unwrap_err();
        assert!(matches!(err, Error::Custom(_)));
    }

    #[tokio::test]
    async fn test_fetch_unknown_component_fails() {
        let ctx = FetchContext::builder(Side::Client).build();
        let err = ctx.fetch("Missing", Side::Client).await.unwrap_err();
        assert!(matches!(err, Error::FetcherNotFound(ref id) if id == "Missing"));
    }
}
