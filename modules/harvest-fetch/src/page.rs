use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// How a page is acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Plain HTTP GET, no script execution.
    Static,
    /// Headless browser, DOM serialized after client-side scripts run.
    Rendered,
}

/// What the page body is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    StaticHtml,
    RenderedDom,
}

impl From<FetchMode> for ContentKind {
    fn from(mode: FetchMode) -> Self {
        match mode {
            FetchMode::Static => ContentKind::StaticHtml,
            FetchMode::Rendered => ContentKind::RenderedDom,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// URL as requested.
    pub url: String,
    /// URL after redirects; relative links resolve against this.
    pub final_url: String,
    pub body: String,
    pub kind: ContentKind,
    pub status: Option<u16>,
}

impl FetchedPage {
    pub fn is_rendered(&self) -> bool {
        self.kind == ContentKind::RenderedDom
    }
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFailureKind {
    Timeout,
    ServerError,
    RateLimited,
    Network,
    Blocked,
    NotFound,
    RenderUnavailable,
}

impl FetchFailureKind {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FetchFailureKind::Timeout
                | FetchFailureKind::ServerError
                | FetchFailureKind::RateLimited
                | FetchFailureKind::Network
        )
    }

    /// Map a non-success HTTP status to a failure kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => FetchFailureKind::NotFound,
            408 => FetchFailureKind::Timeout,
            429 => FetchFailureKind::RateLimited,
            500..=599 => FetchFailureKind::ServerError,
            _ => FetchFailureKind::Blocked,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailureKind::Timeout => "timeout",
            FetchFailureKind::ServerError => "server_error",
            FetchFailureKind::RateLimited => "rate_limited",
            FetchFailureKind::Network => "network",
            FetchFailureKind::Blocked => "blocked",
            FetchFailureKind::NotFound => "not_found",
            FetchFailureKind::RenderUnavailable => "render_unavailable",
        }
    }
}

impl fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed page-acquisition failure. Returned as data, never fatal to the run.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind} fetching {url}: {message}")]
pub struct FetchFailure {
    pub kind: FetchFailureKind,
    pub url: String,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FetchFailureKind, url: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }

    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchFailureKind::Timeout
        } else if let Some(status) = err.status() {
            FetchFailureKind::from_status(status.as_u16())
        } else {
            FetchFailureKind::Network
        };
        Self::new(kind, url, err.to_string())
    }
}

pub type FetchResult = Result<FetchedPage, FetchFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_map_to_kinds() {
        assert_eq!(FetchFailureKind::from_status(404), FetchFailureKind::NotFound);
        assert_eq!(FetchFailureKind::from_status(410), FetchFailureKind::NotFound);
        assert_eq!(FetchFailureKind::from_status(403), FetchFailureKind::Blocked);
        assert_eq!(FetchFailureKind::from_status(401), FetchFailureKind::Blocked);
        assert_eq!(FetchFailureKind::from_status(429), FetchFailureKind::RateLimited);
        assert_eq!(FetchFailureKind::from_status(500), FetchFailureKind::ServerError);
        assert_eq!(FetchFailureKind::from_status(503), FetchFailureKind::ServerError);
    }

    #[test]
    fn unexpected_statuses_are_not_retried() {
        for status in [100, 300, 304, 418, 600] {
            let kind = FetchFailureKind::from_status(status);
            assert_eq!(kind, FetchFailureKind::Blocked, "status {status}");
            assert!(!kind.is_retriable());
        }
    }

    #[test]
    fn only_transient_kinds_are_retriable() {
        assert!(FetchFailureKind::Timeout.is_retriable());
        assert!(FetchFailureKind::ServerError.is_retriable());
        assert!(FetchFailureKind::RateLimited.is_retriable());
        assert!(!FetchFailureKind::Blocked.is_retriable());
        assert!(!FetchFailureKind::NotFound.is_retriable());
        assert!(!FetchFailureKind::RenderUnavailable.is_retriable());
    }

    #[test]
    fn failure_message_names_kind_and_url() {
        let f = FetchFailure::new(FetchFailureKind::Blocked, "https://www.g2.com/x", "HTTP 403");
        assert_eq!(f.to_string(), "blocked fetching https://www.g2.com/x: HTTP 403");
    }
}
