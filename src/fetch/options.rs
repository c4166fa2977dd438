use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payload format a fetcher reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Json,
    Csv,
    Txt,
    Api,
}

impl DataSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            "api" => Ok(Self::Api),
            _ => Err(Error::UnsupportedFormat(value.to_string())),
        }
    }
}

/// Where a fetch executes; decides which cache table is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Server,
    Client,
}

impl Side {
    #[must_use]
    pub const fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }
}

impl From<bool> for Side {
    fn from(is_server: bool) -> Self {
        if is_server { Self::Server } else { Self::Client }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub enabled: bool,
}

impl Pagination {
    #[must_use]
    pub const fn new(page: u32, limit: u32, enabled: bool) -> Self {
        Self { page, limit, enabled }
    }

    /// A zero limit means "no pagination" even when enabled.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.limit > 0
    }
}

/// Construction-time settings of one fetcher
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub data_source: DataSource,
    component_id: String,
    pub endpoint: Option<String>,
    pub pagination: Pagination,
}

impl FetcherOptions {
    #[must_use]
    pub fn new(component_id: impl Into<String>, data_source: DataSource) -> Self {
        Self {
            data_source,
            component_id: component_id.into(),
            endpoint: None,
            pagination: Pagination::default(),
        }
    }

    /// Builds options from an untyped data source name.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` if `data_source` is not one of `json|csv|txt|api`.
    pub fn parse(component_id: impl Into<String>, data_source: &str) -> Result<Self> {
        Ok(Self::new(component_id, data_source.parse()?))
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub const fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.component_id
    }
}

/// `{format}_{componentId}`, plus `_page{N}_limit{M}` for paginated JSON.
#[must_use]
pub fn cache_key(source: DataSource, component_id: &str, pagination: &Pagination) -> String {
    if source == DataSource::Json && pagination.is_active() {
        format!(
            "{source}_{component_id}_page{}_limit{}",
            pagination.page, pagination.limit
        )
    } else {
        format!("{source}_{component_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_parsing() {
        assert_eq!("json".parse::<DataSource>().unwrap(), DataSource::Json);
        assert_eq!(" CSV ".parse::<DataSource>().unwrap(), DataSource::Csv);
        let err = "xml".parse::<DataSource>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ref v) if v == "xml"));
        assert!(FetcherOptions::parse("UserData", "yaml").is_err());
    }

    #[test]
    fn test_cache_key_pagination_suffix_json_only() {
        let paged = Pagination::new(2, 10, true);
        assert_eq!(
            cache_key(DataSource::Json, "UserData", &paged),
            "json_UserData_page2_limit10"
        );
        assert_eq!(cache_key(DataSource::Csv, "UserData", &paged), "csv_UserData");
        assert_eq!(
            cache_key(DataSource::Json, "UserData", &Pagination::new(2, 0, true)),
            "json_UserData"
        );
        assert_eq!(
            cache_key(DataSource::Json, "UserData", &Pagination::new(2, 10, false)),
            "json_UserData"
        );
    }

    #[test]
    fn test_side_from_flag() {
        assert_eq!(Side::from(true), Side::Server);
        assert!(!Side::from(false).is_server());
    }
}
