// Rendered page fetches: local headless Chrome (--dump-dom) or Browserless.
// Every render runs inside a checked-out BrowserSession.

use std::time::Duration;

use browserless_client::{BrowserlessClient, BrowserlessError, ContentOptions};
use harvest_common::{RenderBackend, RenderSettings};
use tracing::{info, warn};

use crate::page::{ContentKind, FetchFailure, FetchFailureKind, FetchResult, FetchedPage};
use crate::session::{BrowserPool, BrowserSession};

enum Backend {
    Chrome { binary: String },
    Browserless(BrowserlessClient),
}

pub struct Renderer {
    backend: Backend,
    pool: BrowserPool,
    settle: Duration,
    ceiling: Duration,
    user_agent: String,
}

impl Renderer {
    pub fn new(
        backend: &RenderBackend,
        settings: &RenderSettings,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        let (backend, with_profile) = match backend {
            RenderBackend::Chrome { binary } => (
                Backend::Chrome {
                    binary: binary.clone(),
                },
                true,
            ),
            RenderBackend::Browserless { base_url, token } => {
                // Leave headroom over the in-browser navigation ceiling.
                let request_timeout = settings.ceiling + settings.settle + Duration::from_secs(5);
                let client = BrowserlessClient::new(base_url, token.as_deref(), request_timeout)?;
                (Backend::Browserless(client), false)
            }
        };

        info!(
            backend = backend_name(&backend),
            max_sessions = settings.max_sessions,
            "Renderer initialized"
        );

        Ok(Self {
            backend,
            pool: BrowserPool::new(settings.max_sessions, with_profile),
            settle: settings.settle,
            ceiling: settings.ceiling,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    /// Load `url` in a browser, wait for it to settle, and return the serialized DOM.
    pub async fn render(&self, url: &str) -> FetchResult {
        let parsed = url::Url::parse(url).map_err(|e| {
            FetchFailure::new(FetchFailureKind::NotFound, url, format!("invalid URL: {e}"))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchFailure::new(
                FetchFailureKind::NotFound,
                url,
                format!("only http/https URLs allowed, got {}", parsed.scheme()),
            ));
        }

        let session = self.pool.checkout(url).await?;
        info!(url, session = session.id(), fetcher = backend_name(&self.backend), "Rendering page");

        let body = match &self.backend {
            Backend::Chrome { binary } => self.run_chrome(binary, url, &session).await?,
            Backend::Browserless(client) => self.run_browserless(client, url).await?,
        };
        drop(session);

        if body.trim().is_empty() {
            warn!(url, "Rendered fetch returned an empty DOM");
        }

        Ok(FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            body,
            kind: ContentKind::RenderedDom,
            status: None,
        })
    }

    async fn run_chrome(
        &self,
        binary: &str,
        url: &str,
        session: &BrowserSession,
    ) -> Result<String, FetchFailure> {
        let mut args = vec![
            "--headless".to_string(),
            "--no-sandbox".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-agent={}", self.user_agent),
            // Virtual time fast-forwards timers until the page has been idle this long.
            format!("--virtual-time-budget={}", self.settle.as_millis()),
        ];
        if let Some(dir) = session.profile_dir() {
            args.push(format!("--user-data-dir={}", dir.display()));
        }
        args.push("--dump-dom".to_string());
        args.push(url.to_string());

        let child = tokio::process::Command::new(binary)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.ceiling, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                let kind = if e.kind() == std::io::ErrorKind::NotFound {
                    FetchFailureKind::RenderUnavailable
                } else if is_transient_error(&e.to_string()) {
                    FetchFailureKind::Network
                } else {
                    FetchFailureKind::RenderUnavailable
                };
                return Err(FetchFailure::new(
                    kind,
                    url,
                    format!("failed to launch {binary}: {e}"),
                ));
            }
            Err(_) => {
                return Err(FetchFailure::new(
                    FetchFailureKind::Timeout,
                    url,
                    format!("chrome exceeded {}s ceiling", self.ceiling.as_secs()),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url, fetcher = "chrome", stderr = %stderr, "Chrome exited with error");
            let kind = if is_transient_error(&stderr) {
                FetchFailureKind::Network
            } else {
                FetchFailureKind::ServerError
            };
            return Err(FetchFailure::new(
                kind,
                url,
                format!("chrome exited with {}", output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_browserless(
        &self,
        client: &BrowserlessClient,
        url: &str,
    ) -> Result<String, FetchFailure> {
        let options = ContentOptions {
            settle: self.settle,
            navigation_timeout: self.ceiling,
            ..Default::default()
        };
        client
            .content(url, &options)
            .await
            .map_err(|e| browserless_failure(url, e))
    }
}

fn backend_name(backend: &Backend) -> &'static str {
    match backend {
        Backend::Chrome { .. } => "chrome",
        Backend::Browserless(_) => "browserless",
    }
}

fn browserless_failure(url: &str, err: BrowserlessError) -> FetchFailure {
    let kind = match &err {
        BrowserlessError::Timeout(_) => FetchFailureKind::Timeout,
        BrowserlessError::Network(_) => FetchFailureKind::Network,
        BrowserlessError::Api { status, .. } => FetchFailureKind::from_status(*status),
    };
    FetchFailure::new(kind, url, err.to_string())
}

fn is_transient_error(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}
