//! Component data fetchers with dual-sided caching, API retry/fallback and
//! realtime cache invalidation.

pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod realtime;

pub use context::{FetchContext, FetchContextBuilder, FetchEnv};
pub use error::{Error, Result};
