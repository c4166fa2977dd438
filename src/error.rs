use derive_more::From;
use std::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Http(reqwest::Error),

    #[from]
    Csv(csv::Error),

    #[from]
    Io(std::io::Error),

    /// No fetcher is registered under this component id
    FetcherNotFound(String),

    /// Data source value outside `json|csv|txt|api`
    UnsupportedFormat(String),

    /// Upstream answered with a non-2xx status
    Transport { status: u16, url: String },

    /// Upstream answered 429, optionally with a `Retry-After` hint
    RateLimited { retry_after: Option<Duration> },

    /// Payload could not be decoded into the expected shape
    Decode(String),

    /// Custom error message
    Custom(String),
}

impl Error {
    /// Configuration errors are fatal for the fetch that hit them.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::FetcherNotFound(_) | Self::UnsupportedFormat(_))
    }

    /// Whether the API retry ladder should try again after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !self.is_configuration()
    }

    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Copy handed to callers that waited on another caller's fetch.
    ///
    /// Library errors can't be cloned, so they keep their message and
    /// lose their source: JSON and CSV errors become `Decode`, HTTP
    /// errors become `Custom`.
    #[must_use]
    pub fn replicate(&self) -> Self {
        match self {
            Self::Json(e) => Self::Decode(e.to_string()),
            Self::Csv(e) => Self::Decode(e.to_string()),
            Self::Http(e) => Self::Custom(e.to_string()),
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::FetcherNotFound(id) => Self::FetcherNotFound(id.clone()),
            Self::UnsupportedFormat(value) => Self::UnsupportedFormat(value.clone()),
            Self::Transport { status, url } => Self::Transport {
                status: *status,
                url: url.clone(),
            },
            Self::RateLimited { retry_after } => Self::RateLimited {
                retry_after: *retry_after,
            },
            Self::Decode(message) => Self::Decode(message.clone()),
            Self::Custom(message) => Self::Custom(message.clone()),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::FetcherNotFound(component_id) => {
                write!(fmt, "no fetcher registered for component '{component_id}'")
            }
            Self::UnsupportedFormat(value) => write!(fmt, "unsupported data source '{value}'"),
            Self::Transport { status, url } => write!(fmt, "HTTP {status} from {url}"),
            Self::RateLimited { retry_after } => match retry_after {
                Some(delay) => write!(fmt, "rate limited, retry after {}s", delay.as_secs()),
                None => write!(fmt, "rate limited"),
            },
            Self::Decode(message) | Self::Custom(message) => write!(fmt, "{message}"),
            _ => write!(fmt, "{self:?}"),
        }
    }
}

impl std::error::Error for Error {}
