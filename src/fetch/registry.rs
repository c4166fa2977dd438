use super::fetcher::{DynFetcher, Fetcher};
use super::options::{DataSource, Side};
use super::parser::RecordParser;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct EndpointState {
    base_url: String,
    api_base_path: String,
}

/// Base URL and data endpoint path shared by a registry and its fetchers
#[derive(Debug)]
pub struct Endpoints {
    state: RwLock<EndpointState>,
}

impl Endpoints {
    #[must_use]
    pub fn new(base_url: &str, api_base_path: &str) -> Self {
        Self {
            state: RwLock::new(EndpointState {
                base_url: strip_trailing_slash(base_url).to_string(),
                api_base_path: api_base_path.to_string(),
            }),
        }
    }

    pub fn base_url(&self) -> String {
        self.state.read().unwrap_or_else(PoisonError::into_inner).base_url.clone()
    }

    /// Stores `url` with at most one trailing slash removed.
    pub fn set_base_url(&self, url: &str) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).base_url =
            strip_trailing_slash(url).to_string();
    }

    pub fn api_base_path(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .api_base_path
            .clone()
    }

    pub fn set_api_base_path(&self, path: &str) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).api_base_path = path.to_string();
    }

    /// Absolute URL for server-side reads, relative for client-side ones.
    pub fn data_url(&self, component_id: &str, source: DataSource, side: Side) -> String {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner).clone();
        let query = format!(
            "?component={}&dataSource={}",
            urlencoding::encode(component_id),
            source
        );
        match side {
            Side::Server => format!("{}{}{query}", state.base_url, state.api_base_path),
            Side::Client => format!("{}{query}", state.api_base_path),
        }
    }
}

fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}

/// Component id → fetcher map.
///
/// Registering over an existing id disposes the previous fetcher so its
/// bus subscription and caches don't outlive it.
pub struct Registry {
    endpoints: Arc<Endpoints>,
    fetchers: RwLock<HashMap<String, Arc<dyn DynFetcher>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("endpoints", &self.endpoints)
            .field("fetchers", &self.component_ids())
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new(endpoints: Arc<Endpoints>) -> Self {
        Self {
            endpoints,
            fetchers: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Arc<Endpoints> {
        &self.endpoints
    }

    /// Installs `fetcher` under `component_id`, returning the disposed predecessor.
    pub fn register(
        &self,
        component_id: impl Into<String>,
        fetcher: Arc<dyn DynFetcher>,
    ) -> Option<Arc<dyn DynFetcher>> {
        let component_id = component_id.into();
        if component_id != fetcher.component_id() {
            warn!(
                "Registering fetcher for {} under a different id: {}",
                fetcher.component_id(),
                component_id
            );
        }

        let previous = self
            .fetchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(component_id.clone(), Arc::clone(&fetcher));

        match previous {
            Some(old) if !same_fetcher(&old, &fetcher) => {
                info!("♻️  Replacing fetcher for {}", component_id);
                old.dispose();
                Some(old)
            }
            Some(_) => None,
            None => {
                info!("📝 Registered {} fetcher for {}", fetcher.data_source(), component_id);
                None
            }
        }
    }

    /// Convenience for the common case of registering under the fetcher's own id.
    pub fn register_fetcher<P: RecordParser>(
        &self,
        fetcher: Arc<Fetcher<P>>,
    ) -> Option<Arc<dyn DynFetcher>> {
        let component_id = fetcher.component_id().to_string();
        self.register(component_id, fetcher)
    }

    pub fn get_fetcher(&self, component_id: &str) -> Option<Arc<dyn DynFetcher>> {
        self.fetchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component_id)
            .cloned()
    }

    /// # Errors
    ///
    /// Returns `FetcherNotFound` when nothing is registered under `component_id`.
    pub fn require_fetcher(&self, component_id: &str) -> Result<Arc<dyn DynFetcher>> {
        self.get_fetcher(component_id)
            .ok_or_else(|| Error::FetcherNotFound(component_id.to_string()))
    }

    /// Typed access; `None` if missing or registered with a different parser type.
    pub fn get_typed<P: RecordParser>(&self, component_id: &str) -> Option<Arc<Fetcher<P>>> {
        self.get_fetcher(component_id)?
            .as_any()
            .downcast::<Fetcher<P>>()
            .ok()
    }

    pub fn unregister(&self, component_id: &str) -> Option<Arc<dyn DynFetcher>> {
        let removed = self
            .fetchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(component_id);
        if let Some(fetcher) = &removed {
            fetcher.dispose();
        }
        removed
    }

    pub fn component_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .fetchers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.fetchers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disposes and removes every fetcher.
    pub fn clear(&self) {
        let drained: Vec<Arc<dyn DynFetcher>> = self
            .fetchers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, fetcher)| fetcher)
            .collect();
        for fetcher in drained {
            fetcher.dispose();
        }
    }

    pub fn base_url(&self) -> String {
        self.endpoints.base_url()
    }

    pub fn set_base_url(&self, url: &str) {
        self.endpoints.set_base_url(url);
    }

    pub fn api_base_path(&self) -> String {
        self.endpoints.api_base_path()
    }

    pub fn set_api_base_path(&self, path: &str) {
        self.endpoints.set_api_base_path(path);
    }

    pub fn data_url(&self, component_id: &str, source: DataSource, side: Side) -> String {
        self.endpoints.data_url(component_id, source, side)
    }
}

fn same_fetcher(a: &Arc<dyn DynFetcher>, b: &Arc<dyn DynFetcher>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_strips_one_slash() {
        let endpoints = Endpoints::new("http://localhost:3000", "/api/data");
        endpoints.set_base_url("https://example.test//");
        assert_eq!(endpoints.base_url(), "https://example.test/");
        endpoints.set_base_url("https://example.test/");
        assert_eq!(endpoints.base_url(), "https://example.test");
    }

    #[test]
    fn test_data_url_by_side() {
        let endpoints = Endpoints::new("http://localhost:3000/", "/api/data");
        assert_eq!(
            endpoints.data_url("UserData", DataSource::Csv, Side::Server),
            "http://localhost:3000/api/data?component=UserData&dataSource=csv"
        );
        assert_eq!(
            endpoints.data_url("User Data", DataSource::Json, Side::Client),
            "/api/data?component=User%20Data&dataSource=json"
        );

        endpoints.set_api_base_path("/v2/data");
        assert!(endpoints
            .data_url("UserData", DataSource::Txt, Side::Client)
            .starts_with("/v2/data?"));
    }

    #[test]
    fn test_missing_fetcher_is_configuration_error() {
        let registry = Registry::new(Arc::new(Endpoints::new("http://localhost:3000", "/api/data")));
        assert!(registry.get_fetcher("Nope").is_none());
        let err = registry.require_fetcher("Nope").err().unwrap();
        assert!(err.is_configuration());
        assert!(registry.is_empty());
    }
}
