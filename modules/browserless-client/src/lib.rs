pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// How long Browserless should wait for the page to settle before serializing the DOM.
#[derive(Debug, Clone)]
pub struct ContentOptions {
    /// Navigation lifecycle event to wait for (`networkidle2` = no more than two
    /// open connections for 500ms).
    pub wait_until: String,
    /// Extra idle time after navigation, for late client-side rendering.
    pub settle: Duration,
    /// Hard ceiling on navigation inside the browser.
    pub navigation_timeout: Duration,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            wait_until: "networkidle2".to_string(),
            settle: Duration::from_secs(2),
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions<'a>,
    wait_for_timeout: u64,
    best_attempt: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions<'a> {
    wait_until: &'a str,
    timeout: u64,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    /// `request_timeout` bounds the whole HTTP round trip and should exceed the
    /// navigation timeout plus settle time passed to [`BrowserlessClient::content`].
    pub fn new(base_url: &str, token: Option<&str>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML content for a URL via the Browserless /content endpoint.
    pub async fn content(&self, url: &str, options: &ContentOptions) -> Result<String> {
        let body = ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: &options.wait_until,
                timeout: options.navigation_timeout.as_millis() as u64,
            },
            wait_for_timeout: options.settle.as_millis() as u64,
            best_attempt: true,
        };

        debug!(url, wait_until = %options.wait_until, "browserless: requesting rendered content");

        let resp = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 408 {
            return Err(BrowserlessError::Timeout(format!("{url} did not settle")));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_appended_to_endpoint() {
        let client =
            BrowserlessClient::new("http://localhost:3000/", Some("abc"), Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:3000/content?token=abc");
    }

    #[test]
    fn endpoint_without_token() {
        let client =
            BrowserlessClient::new("http://localhost:3000", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:3000/content");
    }

    #[test]
    fn request_body_uses_camel_case_wait_options() {
        let options = ContentOptions::default();
        let body = ContentRequest {
            url: "https://example.com",
            goto_options: GotoOptions {
                wait_until: &options.wait_until,
                timeout: 30_000,
            },
            wait_for_timeout: 2_000,
            best_attempt: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["gotoOptions"]["waitUntil"], "networkidle2");
        assert_eq!(json["waitForTimeout"], 2_000);
        assert_eq!(json["bestAttempt"], true);
    }
}
