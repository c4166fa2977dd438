use super::cached_data::FetchOutcome;
use super::data_cache::{ClientCache, ServerCache};
use super::decode::{JsonPayload, parse_csv, parse_txt};
use super::in_flight::{InFlight, InFlightRole};
use super::options::{DataSource, FetcherOptions, Pagination, Side, cache_key};
use super::parser::RecordParser;
use crate::context::FetchEnv;
use crate::error::{Error, Result};
use crate::realtime::{ChangeAction, DataChangeEvent, Subscription};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Type-erased view of a fetcher, as stored in the registry
#[async_trait]
pub trait DynFetcher: Send + Sync {
    fn component_id(&self) -> &str;

    fn data_source(&self) -> DataSource;

    /// Fetches and re-serializes the records as JSON values.
    async fn fetch_values(
        &self,
        side: Side,
        component_id: Option<&str>,
    ) -> Result<FetchOutcome<Value>>;

    fn set_pagination(&self, page: u32, limit: u32, enabled: bool);

    fn invalidate_cache(&self);

    fn publish_data_change(&self, action: ChangeAction, data: Option<Value>, id: Option<Value>);

    fn dispose(&self);

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Fetch orchestration for one component: format dispatch, both cache
/// tables, pagination state, and the API retry/fallback ladder
pub struct Fetcher<P: RecordParser> {
    options: FetcherOptions,
    pagination: RwLock<Pagination>,
    parser: P,
    env: FetchEnv,
    client_cache: Arc<ClientCache<P::Record>>,
    in_flight: InFlight<P::Record>,
    subscription: Mutex<Option<Subscription>>,
}

impl<P: RecordParser> std::fmt::Debug for Fetcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("component_id", &self.options.component_id())
            .field("data_source", &self.options.data_source)
            .field("pagination", &self.pagination())
            .finish_non_exhaustive()
    }
}

impl<P: RecordParser> Fetcher<P> {
    /// Creates the fetcher and subscribes it to bus events for its component;
    /// every event invalidates its caches.
    #[must_use]
    pub fn new(env: &FetchEnv, options: FetcherOptions, parser: P) -> Arc<Self> {
        let client_cache = Arc::new(ClientCache::new(env.config.client_cache_ttl));

        let subscription = {
            let component_id = options.component_id().to_string();
            let client_cache = Arc::clone(&client_cache);
            let server_cache = Arc::clone(&env.server_cache);
            env.bus.subscribe(options.component_id(), move |event| {
                debug!("🔔 {:?} on {}, invalidating cache", event.action, component_id);
                invalidate(&component_id, &*client_cache, &server_cache);
            })
        };

        Arc::new(Self {
            pagination: RwLock::new(options.pagination),
            options,
            parser,
            env: env.clone(),
            client_cache,
            in_flight: InFlight::new(),
            subscription: Mutex::new(Some(subscription)),
        })
    }

    #[must_use]
    pub fn component_id(&self) -> &str {
        self.options.component_id()
    }

    #[must_use]
    pub const fn options(&self) -> &FetcherOptions {
        &self.options
    }

    #[must_use]
    pub const fn parser(&self) -> &P {
        &self.parser
    }

    #[must_use]
    pub const fn client_cache(&self) -> &Arc<ClientCache<P::Record>> {
        &self.client_cache
    }

    pub fn pagination(&self) -> Pagination {
        *self.pagination.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Changes the page used by later fetches; does not fetch.
    pub fn set_pagination(&self, page: u32, limit: u32, enabled: bool) {
        *self.pagination.write().unwrap_or_else(PoisonError::into_inner) =
            Pagination::new(page, limit, enabled);
    }

    /// Runs the raw records through this fetcher's parser.
    pub fn parse_data(&self, raw: Value) -> Vec<P::Record> {
        self.parser.parse_data(raw)
    }

    /// Cache first, then the format-specific read.
    ///
    /// `component_id` overrides the id used for the URL and cache key of
    /// this call only.
    ///
    /// # Errors
    ///
    /// json/csv/txt sources fail on transport or decode errors. The api
    /// source never fails.
    pub async fn fetch_data(
        &self,
        side: Side,
        component_id: Option<&str>,
    ) -> Result<FetchOutcome<P::Record>> {
        let component_id = component_id.unwrap_or_else(|| self.component_id());
        self.fetch_source(side, self.options.data_source, component_id).await
    }

    /// The api path on its own; always resolves, at worst to fallback or empty data.
    pub async fn fetch_api_data(&self, side: Side, component_id: Option<&str>) -> FetchOutcome<P::Record> {
        let component_id = component_id.unwrap_or_else(|| self.component_id());
        match self.fetch_source(side, DataSource::Api, component_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("❌ API fetch for {} failed: {}", component_id, e);
                FetchOutcome::empty()
            }
        }
    }

    /// Serves from cache or joins the single read in flight for the key.
    async fn fetch_source(
        &self,
        side: Side,
        source: DataSource,
        component_id: &str,
    ) -> Result<FetchOutcome<P::Record>> {
        let pagination = self.pagination();
        let key = cache_key(source, component_id, &pagination);
        let flight_key = format!("{side:?}:{key}");

        loop {
            if let Some(hit) = self.cached(side, &key) {
                return Ok(hit);
            }

            match self.in_flight.join(&flight_key) {
                InFlightRole::Leader(leader) => {
                    // a read for this key may have completed since the check above
                    let result = match self.cached(side, &key) {
                        Some(hit) => Ok(hit),
                        None => self.read_source(side, source, component_id, &pagination, &key).await,
                    };
                    leader.complete(&result);
                    return result;
                }
                InFlightRole::Follower(follower) => {
                    if let Some(result) = follower.wait().await {
                        debug!("Shared in-flight result for {}", key);
                        return result;
                    }
                    debug!("In-flight read for {} was abandoned, retrying", key);
                }
            }
        }
    }

    async fn read_source(
        &self,
        side: Side,
        source: DataSource,
        component_id: &str,
        pagination: &Pagination,
        key: &str,
    ) -> Result<FetchOutcome<P::Record>> {
        let start = Instant::now();
        let result = match source {
            DataSource::Json => self.fetch_json_data(side, component_id, pagination, key).await,
            DataSource::Csv | DataSource::Txt => {
                self.fetch_text_data(side, source, component_id, key).await
            }
            DataSource::Api => Ok(self.fetch_api_data_keyed(side, component_id, key).await),
        };

        match &result {
            Ok(outcome) => info!(
                "✅ FETCH {}: {} records ({:.2}s)",
                key,
                outcome.data.len(),
                start.elapsed().as_secs_f64()
            ),
            Err(e) => error!("❌ FETCH FAILED: {} - {}", key, e),
        }
        result
    }

    /// Drops this component's entries from the client cache and from the
    /// context's server cache.
    pub fn invalidate_cache(&self) {
        invalidate(self.component_id(), &*self.client_cache, &self.env.server_cache);
    }

    pub fn publish_data_change(&self, action: ChangeAction, data: Option<Value>, id: Option<Value>) {
        let event = DataChangeEvent {
            component_id: self.component_id().to_string(),
            action,
            data,
            id,
        };
        self.env.bus.publish(&event);
    }

    /// Leaves the bus and clears caches. Idempotent.
    pub fn dispose(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            self.invalidate_cache();
            debug!("Disposed fetcher for {}", self.component_id());
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn cached(&self, side: Side, key: &str) -> Option<FetchOutcome<P::Record>> {
        match side {
            Side::Server => self.env.server_cache.get(key),
            Side::Client => self.client_cache.get(key),
        }
    }

    fn store(&self, side: Side, key: &str, outcome: &FetchOutcome<P::Record>) {
        match side {
            Side::Server => self.env.server_cache.put(key, outcome),
            Side::Client => self.client_cache.put(key, outcome),
        }
    }

    fn outcome_from_json(&self, payload: JsonPayload, component_id: &str) -> FetchOutcome<P::Record> {
        let (records, total_items, total_pages) = payload.into_parts(component_id);
        FetchOutcome::new(self.parse_data(Value::Array(records))).with_totals(total_items, total_pages)
    }

    async fn read_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        component_id: &str,
    ) -> Result<FetchOutcome<P::Record>> {
        let response = self.env.http.get(url, headers).await?.error_for_status(url)?;
        let payload = JsonPayload::from_body(&response.body)?;
        Ok(self.outcome_from_json(payload, component_id))
    }

    async fn fetch_json_data(
        &self,
        side: Side,
        component_id: &str,
        pagination: &Pagination,
        key: &str,
    ) -> Result<FetchOutcome<P::Record>> {
        let mut url = self.env.endpoints.data_url(component_id, DataSource::Json, side);
        if pagination.is_active() {
            url.push_str(&format!("&page={}&limit={}", pagination.page, pagination.limit));
        }

        let outcome = self.read_json(&url, &BTreeMap::new(), component_id).await?;
        self.store(side, key, &outcome);
        Ok(outcome)
    }

    async fn fetch_text_data(
        &self,
        side: Side,
        source: DataSource,
        component_id: &str,
        key: &str,
    ) -> Result<FetchOutcome<P::Record>> {
        let url = self.env.endpoints.data_url(component_id, source, side);
        let response = self
            .env
            .http
            .get(&url, &BTreeMap::new())
            .await?
            .error_for_status(&url)?;

        let records = match source {
            DataSource::Csv => parse_csv(&response.body)?,
            DataSource::Txt => parse_txt(&response.body),
            other => return Err(Error::UnsupportedFormat(other.to_string())),
        };

        let outcome = FetchOutcome::new(self.parse_data(Value::Array(records)));
        self.store(side, key, &outcome);
        Ok(outcome)
    }

    async fn fetch_api_data_keyed(&self, side: Side, component_id: &str, key: &str) -> FetchOutcome<P::Record> {
        let Some(endpoint) = self.options.endpoint.as_deref() else {
            warn!("⚠️  No API endpoint configured for {}", component_id);
            return FetchOutcome::empty();
        };

        match self.fetch_with_retry(endpoint, component_id).await {
            Ok(outcome) => {
                self.store(side, key, &outcome);
                outcome
            }
            Err(e) => {
                error!("💀 API fetch for {} abandoned: {}", component_id, e);
                self.fallback_outcome(side, component_id).await
            }
        }
    }

    async fn fetch_with_retry(&self, endpoint: &str, component_id: &str) -> Result<FetchOutcome<P::Record>> {
        let policy = self.env.config.retry;
        let headers = self.env.config.api_headers();
        let mut last_error = Error::Custom(format!("no attempts made for {component_id}"));

        for attempt in 0..policy.max_attempts {
            match self.read_json(endpoint, &headers, component_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    let delay = e.retry_after().unwrap_or_else(|| policy.backoff(attempt));
                    if attempt + 1 < policy.max_attempts {
                        warn!(
                            "🔄 API RETRY: {} failed ({}), attempt {}/{} in {}ms",
                            component_id,
                            e,
                            attempt + 2,
                            policy.max_attempts,
                            delay.as_millis()
                        );
                        sleep(delay).await;
                    }
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Local fallback endpoint (client side only), then the injected provider.
    async fn fallback_outcome(&self, side: Side, component_id: &str) -> FetchOutcome<P::Record> {
        if side == Side::Client {
            let url = self.env.endpoints.data_url(component_id, DataSource::Json, Side::Client);
            match self.read_json(&url, &BTreeMap::new(), component_id).await {
                Ok(outcome) => {
                    info!("🛟 Served {} from fallback endpoint", component_id);
                    return outcome;
                }
                Err(e) => warn!("Fallback endpoint failed for {}: {}", component_id, e),
            }
        }

        match self.env.fallback.fallback_data(component_id) {
            Some(records) => {
                info!("🛟 Served {} from fallback provider ({} records)", component_id, records.len());
                FetchOutcome::new(self.parse_data(Value::Array(records)))
            }
            None => FetchOutcome::empty(),
        }
    }
}

fn invalidate(component_id: &str, client_cache: &ClientCache<impl Clone>, server_cache: &ServerCache) {
    let client = client_cache.invalidate_component(component_id);
    let server = server_cache.invalidate_component(component_id);
    if client + server > 0 {
        info!(
            "🧹 Invalidated {} client and {} server entries for {}",
            client, server, component_id
        );
    }
}

#[async_trait]
impl<P: RecordParser> DynFetcher for Fetcher<P> {
    fn component_id(&self) -> &str {
        Self::component_id(self)
    }

    fn data_source(&self) -> DataSource {
        self.options.data_source
    }

    async fn fetch_values(
        &self,
        side: Side,
        component_id: Option<&str>,
    ) -> Result<FetchOutcome<Value>> {
        let outcome = self.fetch_data(side, component_id).await?;
        let FetchOutcome {
            data,
            total_items,
            total_pages,
        } = outcome;
        let values = data
            .iter()
            .map(serde_json::to_value)
            .collect::<core::result::Result<Vec<_>, _>>()?;
        Ok(FetchOutcome::new(values).with_totals(total_items, total_pages))
    }

    fn set_pagination(&self, page: u32, limit: u32, enabled: bool) {
        Self::set_pagination(self, page, limit, enabled);
    }

    fn invalidate_cache(&self) {
        Self::invalidate_cache(self);
    }

    fn publish_data_change(&self, action: ChangeAction, data: Option<Value>, id: Option<Value>) {
        Self::publish_data_change(self, action, data, id);
    }

    fn dispose(&self) {
        Self::dispose(self);
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
