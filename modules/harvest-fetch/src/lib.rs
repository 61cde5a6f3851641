// Page acquisition for review scraping.
//
// PageFetcher is the one seam between adapters and the network: a static
// HTTP client plus an optional rendered backend (headless Chrome or
// Browserless). Failures come back as typed data so adapters decide whether
// to retry, escalate or stop.

pub mod escalation;
pub mod http;
pub mod page;
pub mod render;
pub mod retry;
pub mod session;

use async_trait::async_trait;
use tracing::info;

use harvest_common::HarvestConfig;

pub use escalation::{decide, initial_mode, Escalation, PageSignature, StaticOutcome};
pub use http::StaticClient;
pub use page::{ContentKind, FetchFailure, FetchFailureKind, FetchMode, FetchResult, FetchedPage};
pub use render::Renderer;
pub use retry::{fetch_with_retry, RetryPolicy};
pub use session::{BrowserPool, BrowserSession};

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Acquire one page. Never panics and never returns a fatal error.
    async fn fetch(&self, url: &str, mode: FetchMode) -> FetchResult;

    /// Whether `FetchMode::Rendered` can succeed at all.
    fn can_render(&self) -> bool;
}

/// Production fetcher: static client plus an optional renderer.
pub struct HttpPageFetcher {
    client: StaticClient,
    renderer: Option<Renderer>,
}

impl HttpPageFetcher {
    pub fn new(client: StaticClient, renderer: Option<Renderer>) -> Self {
        Self { client, renderer }
    }

    /// Build from run config. No renderer is created when the config has no
    /// render backend.
    pub fn from_config(config: &HarvestConfig) -> anyhow::Result<Self> {
        let client = StaticClient::new(&config.fetch)?;
        let renderer = match config.render.backend {
            Some(ref backend) => Some(Renderer::new(backend, &config.render, &config.fetch.user_agent)?),
            None => {
                info!("No render backend configured, rendered fetches disabled");
                None
            }
        };
        Ok(Self::new(client, renderer))
    }

    /// Stop handing out browser sessions; pending rendered fetches fail fast.
    pub fn shutdown(&self) {
        if let Some(ref renderer) = self.renderer {
            renderer.pool().close();
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode) -> FetchResult {
        match mode {
            FetchMode::Static => self.client.get(url).await,
            FetchMode::Rendered => match self.renderer {
                Some(ref renderer) => renderer.render(url).await,
                None => Err(FetchFailure::new(
                    FetchFailureKind::RenderUnavailable,
                    url,
                    "no render backend configured",
                )),
            },
        }
    }

    fn can_render(&self) -> bool {
        self.renderer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use harvest_common::{DateWindow, Source};

    fn config() -> HarvestConfig {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        HarvestConfig::new("Acme", window, vec![Source::G2]).unwrap()
    }

    #[tokio::test]
    async fn rendered_without_backend_is_unavailable() {
        let fetcher = HttpPageFetcher::from_config(&config()).unwrap();
        assert!(!fetcher.can_render());
        let err = fetcher
            .fetch("https://www.g2.com/products/acme/reviews", FetchMode::Rendered)
            .await
            .unwrap_err();
        assert_eq!(err.kind, FetchFailureKind::RenderUnavailable);
        assert!(!err.is_retriable());
    }
}
