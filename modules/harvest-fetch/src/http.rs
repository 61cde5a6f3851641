// Static page fetches over plain HTTP with a browser-like header set.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, UPGRADE_INSECURE_REQUESTS};
use tracing::{debug, info, warn};

use harvest_common::FetchSettings;

use crate::page::{ContentKind, FetchFailure, FetchFailureKind, FetchResult, FetchedPage};

/// Markers of interstitial bot-challenge pages served with a 200 status.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "<title>Just a moment...</title>",
    "Attention Required! | Cloudflare",
    "px-captcha",
];

pub struct StaticClient {
    client: reqwest::Client,
}

impl StaticClient {
    pub fn new(settings: &FetchSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let mut builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(&settings.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = settings.proxy {
            info!(proxy = proxy.as_str(), "Routing static fetches through proxy");
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// One GET, no retries. Non-2xx statuses come back as typed failures.
    pub async fn get(&self, url: &str) -> FetchResult {
        debug!(url, fetcher = "static", "Fetching page");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::from_reqwest(url, &e))?;

        let status = resp.status();
        let final_url = resp.url().to_string();

        if !status.is_success() {
            let kind = FetchFailureKind::from_status(status.as_u16());
            warn!(url, status = status.as_u16(), kind = %kind, "Static fetch rejected");
            return Err(FetchFailure::new(kind, url, format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchFailure::from_reqwest(url, &e))?;

        if is_challenge_page(&body) {
            warn!(url, "Static fetch hit a bot challenge page");
            return Err(FetchFailure::new(
                FetchFailureKind::Blocked,
                url,
                "bot challenge interstitial",
            ));
        }

        debug!(url, status = status.as_u16(), bytes = body.len(), "Static fetch ok");

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            body,
            kind: ContentKind::StaticHtml,
            status: Some(status.as_u16()),
        })
    }
}

pub(crate) fn is_challenge_page(body: &str) -> bool {
    // Challenge pages are small; skip scanning large real documents.
    body.len() < 64 * 1024 && CHALLENGE_MARKERS.iter().any(|m| body.contains(m))
}
