pub mod cached_data;
pub mod data_cache;
pub mod decode;
pub mod fallback;
pub mod fetcher;
pub mod http;
pub mod in_flight;
pub mod options;
pub mod parser;
pub mod registry;

pub use cached_data::{CacheEntry, FetchOutcome};
pub use data_cache::{ClientCache, ServerCache};
pub use decode::{JsonPayload, PageInfo, parse_csv, parse_txt};
pub use fallback::{FallbackProvider, NoFallback, StaticFallback, sample_products, sample_users};
pub use fetcher::{DynFetcher, Fetcher};
pub use http::{HttpClient, HttpResponse, ReqwestHttpClient};
pub use in_flight::{Follower, InFlight, InFlightRole, Leader};
pub use options::{DataSource, FetcherOptions, Pagination, Side, cache_key};
pub use parser::{RecordParser, SerdeParser, ValueParser, coerce_u64};
pub use registry::{Endpoints, Registry};
